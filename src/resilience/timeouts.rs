//! Timeout enforcement for operations.
//!
//! Breakers never impose a deadline; each operation bounds itself. This helper
//! is what the health monitor and the drill tiers use to do so.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The wrapped future did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {limit:?}")]
pub struct TimeoutError {
    pub limit: Duration,
}

/// Await `future`, giving up after `limit`. The future is dropped on timeout.
pub async fn with_timeout<F: Future>(limit: Duration, future: F) -> Result<F::Output, TimeoutError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimeoutError { limit })
}
