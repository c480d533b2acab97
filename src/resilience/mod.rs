//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Logical operation with ordered tiers:
//!     → fallback.rs (try tiers in order, skip open ones)
//!         → manager.rs (look up the tier's breaker)
//!         → circuit_breaker.rs (admit, run, record outcome in window.rs)
//!             → tier operation, optionally wrapped in
//!               retries.rs (+ backoff.rs) and timeouts.rs
//!     → first success, or AllTiersFailedError (errors.rs)
//! ```
//!
//! # Design Decisions
//! - Each piece is usable alone; composition is the caller's choice
//! - Breakers own no timers and impose no deadlines
//! - State lives in explicitly constructed values, never in globals

pub mod backoff;
pub mod circuit_breaker;
pub mod errors;
pub mod fallback;
pub mod manager;
pub mod retries;
pub mod timeouts;
pub mod window;

pub use circuit_breaker::{BreakerMetrics, CircuitBreaker, CircuitState};
pub use errors::{
    AllTiersFailedError, CallError, CircuitOpenError, ManagerError, RetryError, TierError,
    TierFailure,
};
pub use fallback::{FallbackHandler, FallbackStats, Tier};
pub use manager::CircuitBreakerManager;
pub use retries::RetryPolicy;
pub use timeouts::{with_timeout, TimeoutError};
