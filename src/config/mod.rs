//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), optional
//!     → loader.rs (parse & deserialize, RESILIENCE_* env overrides)
//!     → validation.rs (range checks, all errors reported)
//!     → ResilienceConfig (validated, immutable)
//!     → breakers, retry policy and health monitor built from it at startup
//! ```
//!
//! # Design Decisions
//! - Config is read once; breakers live for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Components re-validate their own section at construction

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::{
    BreakerConfig, FallbackConfig, HealthCheckConfig, LogFormat, ObservabilityConfig,
    ResilienceConfig, RetryConfig, TierOverrides,
};
pub use validation::{validate_config, InvalidConfigError, ValidationError};
