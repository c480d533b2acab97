//! Multi-tier resilience core.
//!
//! Per-tier circuit breakers, exponential-backoff retry, ordered tier
//! fallback and a background health monitor, wired together from one
//! TOML configuration.

pub mod config;
pub mod drill;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ResilienceConfig;
pub use health::{HealthMonitor, HealthSnapshot};
pub use lifecycle::Shutdown;
pub use resilience::{
    CircuitBreaker, CircuitBreakerManager, CircuitState, FallbackHandler, RetryPolicy, Tier,
};
