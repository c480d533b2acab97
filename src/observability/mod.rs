//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! breaker / retry / fallback / health monitor produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
