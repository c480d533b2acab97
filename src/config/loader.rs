//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, with environment
/// overrides applied on top.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ResilienceConfig = toml::from_str(&content)?;
    finish(config)
}

/// Resolve the effective configuration: the file if one is given, defaults
/// otherwise, then environment overrides and validation.
pub fn resolve_config(path: Option<&Path>) -> Result<ResilienceConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => finish(ResilienceConfig::default()),
    }
}

fn finish(mut config: ResilienceConfig) -> Result<ResilienceConfig, ConfigError> {
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `RESILIENCE_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<L>(config: &mut ResilienceConfig, lookup: L) -> Result<(), ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let breaker = &mut config.breaker;
    override_from(&lookup, "RESILIENCE_FAILURE_THRESHOLD", &mut breaker.failure_threshold)?;
    override_from(
        &lookup,
        "RESILIENCE_RECOVERY_TIMEOUT_SECS",
        &mut breaker.recovery_timeout_secs,
    )?;
    override_from(
        &lookup,
        "RESILIENCE_HALF_OPEN_MAX_CALLS",
        &mut breaker.half_open_max_calls,
    )?;
    override_from(&lookup, "RESILIENCE_SUCCESS_THRESHOLD", &mut breaker.success_threshold)?;

    let retry = &mut config.retry;
    override_from(&lookup, "RESILIENCE_MAX_RETRY_ATTEMPTS", &mut retry.max_attempts)?;
    override_from(&lookup, "RESILIENCE_RETRY_BASE_DELAY_MS", &mut retry.base_delay_ms)?;
    override_from(&lookup, "RESILIENCE_RETRY_MAX_DELAY_MS", &mut retry.max_delay_ms)?;
    override_from(
        &lookup,
        "RESILIENCE_RETRY_EXPONENTIAL_BASE",
        &mut retry.exponential_base,
    )?;
    override_from(&lookup, "RESILIENCE_RETRY_JITTER_ENABLED", &mut retry.jitter)?;

    override_from(
        &lookup,
        "RESILIENCE_HEALTH_CHECK_INTERVAL_SECS",
        &mut config.health_check.interval_secs,
    )?;
    Ok(())
}

fn override_from<L, T>(lookup: &L, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var, value })?;
        tracing::debug!(var, "Applied environment override");
    }
    Ok(())
}
