//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges. Every component
//! validates its own settings at construction ([`BreakerConfig::validate`],
//! [`RetryConfig::validate`]); [`validate_config`] runs all of those checks
//! over a whole file and reports every problem, not just the first.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::config::schema::{
    BreakerConfig, HealthCheckConfig, ObservabilityConfig, ResilienceConfig, RetryConfig,
};

/// A single out-of-range setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct InvalidConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// An [`InvalidConfigError`] located in a config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub section: String,
    pub error: InvalidConfigError,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.section, self.error)
    }
}

impl BreakerConfig {
    /// Every problem with this breaker configuration.
    pub fn problems(&self) -> Vec<InvalidConfigError> {
        let mut problems = Vec::new();
        if self.failure_threshold == 0 {
            problems.push(InvalidConfigError::new("failure_threshold", "must be at least 1"));
        }
        if self.recovery_timeout_secs == 0 {
            problems.push(InvalidConfigError::new(
                "recovery_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.half_open_max_calls == 0 {
            problems.push(InvalidConfigError::new("half_open_max_calls", "must be at least 1"));
        }
        if self.success_threshold == 0 {
            problems.push(InvalidConfigError::new("success_threshold", "must be at least 1"));
        }
        if self.window_size == 0 {
            problems.push(InvalidConfigError::new("window_size", "must be at least 1"));
        }
        problems
    }

    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        first(self.problems())
    }
}

impl RetryConfig {
    /// Every problem with this retry configuration.
    pub fn problems(&self) -> Vec<InvalidConfigError> {
        let mut problems = Vec::new();
        if self.max_attempts == 0 {
            problems.push(InvalidConfigError::new("max_attempts", "must be at least 1"));
        }
        if self.base_delay_ms == 0 {
            problems.push(InvalidConfigError::new("base_delay_ms", "must be greater than 0"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            problems.push(InvalidConfigError::new(
                "max_delay_ms",
                format!(
                    "{} is below base_delay_ms ({})",
                    self.max_delay_ms, self.base_delay_ms
                ),
            ));
        }
        if !self.exponential_base.is_finite() || self.exponential_base <= 1.0 {
            problems.push(InvalidConfigError::new(
                "exponential_base",
                format!("{} must be a finite number above 1", self.exponential_base),
            ));
        }
        problems
    }

    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        first(self.problems())
    }
}

impl HealthCheckConfig {
    pub fn problems(&self) -> Vec<InvalidConfigError> {
        let mut problems = Vec::new();
        if self.interval_secs == 0 {
            problems.push(InvalidConfigError::new("interval_secs", "must be greater than 0"));
        }
        if self.timeout_secs == 0 {
            problems.push(InvalidConfigError::new("timeout_secs", "must be greater than 0"));
        }
        problems
    }

    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        first(self.problems())
    }
}

impl ObservabilityConfig {
    pub fn problems(&self) -> Vec<InvalidConfigError> {
        let mut problems = Vec::new();
        if self.metrics_enabled
            && self.metrics_address.parse::<std::net::SocketAddr>().is_err()
        {
            problems.push(InvalidConfigError::new(
                "metrics_address",
                format!("'{}' is not a socket address", self.metrics_address),
            ));
        }
        problems
    }
}

fn first(problems: Vec<InvalidConfigError>) -> Result<(), InvalidConfigError> {
    match problems.into_iter().next() {
        Some(problem) => Err(problem),
        None => Ok(()),
    }
}

/// Validate a whole configuration, returning all errors found.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut push = |section: String, problems: Vec<InvalidConfigError>| {
        errors.extend(
            problems
                .into_iter()
                .map(|error| ValidationError {
                    section: section.clone(),
                    error,
                }),
        );
    };

    push("breaker".to_string(), config.breaker.problems());
    for name in config.tiers.keys() {
        push(format!("tiers.{name}"), config.breaker_for(name).problems());
    }
    push("retry".to_string(), config.retry.problems());
    push("health_check".to_string(), config.health_check.problems());
    push("observability".to_string(), config.observability.problems());

    let mut seen = HashSet::new();
    let mut order_problems = Vec::new();
    for name in &config.fallback.order {
        if name.trim().is_empty() {
            order_problems.push(InvalidConfigError::new("order", "tier names must not be empty"));
        } else if !seen.insert(name.as_str()) {
            order_problems.push(InvalidConfigError::new(
                "order",
                format!("tier '{name}' is listed more than once"),
            ));
        }
    }
    push("fallback".to_string(), order_problems);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
