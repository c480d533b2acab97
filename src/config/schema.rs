//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the resilience
//! core. All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Breaker settings shared by every tier unless overridden.
    pub breaker: BreakerConfig,

    /// Per-tier breaker overrides, keyed by tier name.
    pub tiers: BTreeMap<String, TierOverrides>,

    /// Fallback ordering.
    pub fallback: FallbackConfig,

    /// Retry policy settings.
    pub retry: RetryConfig,

    /// Background health probing.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ResilienceConfig {
    /// Effective breaker configuration for `tier`: the shared defaults with the
    /// tier's overrides applied on top.
    pub fn breaker_for(&self, tier: &str) -> BreakerConfig {
        match self.tiers.get(tier) {
            Some(overrides) => overrides.apply(&self.breaker),
            None => self.breaker.clone(),
        }
    }

    /// All tier names, fallback order first, then any tier that only appears
    /// under `[tiers]`.
    pub fn tier_names(&self) -> Vec<String> {
        let mut names = self.fallback.order.clone();
        for name in self.tiers.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures (while closed) that trip the breaker open.
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before admitting a probe.
    pub recovery_timeout_secs: u64,

    /// Concurrent probe calls allowed while half-open.
    pub half_open_max_calls: u32,

    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,

    /// Number of recent outcomes kept for the reported error rate.
    pub window_size: usize,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            half_open_max_calls: 1,
            success_threshold: 2,
            window_size: 100,
        }
    }
}

/// Optional per-tier overrides of [`BreakerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TierOverrides {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_secs: Option<u64>,
    pub half_open_max_calls: Option<u32>,
    pub success_threshold: Option<u32>,
    pub window_size: Option<usize>,
}

impl TierOverrides {
    fn apply(&self, base: &BreakerConfig) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            recovery_timeout_secs: self
                .recovery_timeout_secs
                .unwrap_or(base.recovery_timeout_secs),
            half_open_max_calls: self.half_open_max_calls.unwrap_or(base.half_open_max_calls),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            window_size: self.window_size.unwrap_or(base.window_size),
        }
    }
}

/// Fallback ordering configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Tier names in preference order.
    pub order: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            order: vec![
                "primary".to_string(),
                "secondary".to_string(),
                "tertiary".to_string(),
            ],
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per retry.
    pub exponential_base: f64,

    /// Randomize each delay by a factor in [0.5, 1.5).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background health monitor.
    pub enabled: bool,

    /// Seconds between probe cycles.
    pub interval_secs: u64,

    /// Seconds a single probe may run before it counts as unhealthy.
    pub timeout_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize_from_empty() {
        let config: ResilienceConfig = toml::from_str("").unwrap();
        assert_eq!(config, ResilienceConfig::default());
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.health_check.interval_secs, 30);
    }

    #[test]
    fn test_tier_overrides_merge() {
        let config: ResilienceConfig = toml::from_str(
            r#"
            [breaker]
            failure_threshold = 4
            recovery_timeout_secs = 30

            [tiers.secondary]
            failure_threshold = 10
            "#,
        )
        .unwrap();

        let secondary = config.breaker_for("secondary");
        assert_eq!(secondary.failure_threshold, 10);
        assert_eq!(secondary.recovery_timeout_secs, 30);

        let primary = config.breaker_for("primary");
        assert_eq!(primary.failure_threshold, 4);
    }

    #[test]
    fn test_tier_names_keep_fallback_order() {
        let config: ResilienceConfig = toml::from_str(
            r#"
            [fallback]
            order = ["rpc", "sdk"]

            [tiers.rest]
            success_threshold = 1

            [tiers.rpc]
            failure_threshold = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.tier_names(), vec!["rpc", "sdk", "rest"]);
    }

    #[test]
    fn test_log_format_lowercase() {
        let config: ObservabilityConfig = toml::from_str("log_format = \"json\"").unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
