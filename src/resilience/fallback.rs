//! Tiered fallback.
//!
//! # Data Flow
//! ```text
//! execute_with_fallback([(tier, op), ...], label)
//!     for each tier, in the given order:
//!         → manager.get(tier)          (unknown tier: record, continue)
//!         → breaker open & not due?    (skip without calling op, record)
//!         → breaker.call(op)
//!             Ok  → return, later tiers untouched
//!             Err → record (tier, error), continue
//!     → AllTiersFailedError { label, attempted }
//! ```
//!
//! The handler knows nothing about tier names; order and subset are chosen by
//! the caller per invocation.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;

use crate::observability::metrics;
use crate::resilience::errors::{AllTiersFailedError, CallError, TierError, TierFailure};
use crate::resilience::manager::CircuitBreakerManager;

type TierOperation<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

/// One entry of a fallback sequence: a tier name and the work to run on it.
pub struct Tier<T, E> {
    name: String,
    operation: TierOperation<T, E>,
}

impl<T, E> Tier<T, E> {
    pub fn new<F, Fut>(name: impl Into<String>, operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            operation: Box::new(move || operation().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Per-label fallback counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FallbackStats {
    pub invocations: u64,
    /// Successful invocations by the tier that served them.
    pub served_by: BTreeMap<String, u64>,
    /// Invocations in which every tier failed.
    pub exhausted: u64,
}

/// Runs an operation against ordered tiers, each behind its own breaker.
#[derive(Debug)]
pub struct FallbackHandler {
    manager: Arc<CircuitBreakerManager>,
    stats: DashMap<String, FallbackStats>,
}

impl FallbackHandler {
    pub fn new(manager: Arc<CircuitBreakerManager>) -> Self {
        Self {
            manager,
            stats: DashMap::new(),
        }
    }

    pub fn manager(&self) -> &Arc<CircuitBreakerManager> {
        &self.manager
    }

    /// Try `tiers` in order and return the first success.
    pub async fn execute_with_fallback<T, E>(
        &self,
        tiers: Vec<Tier<T, E>>,
        operation: &str,
    ) -> Result<T, AllTiersFailedError<E>>
    where
        E: Display,
    {
        let mut attempted: Vec<TierFailure<E>> = Vec::with_capacity(tiers.len());

        for (position, tier) in tiers.into_iter().enumerate() {
            let Tier {
                name,
                operation: tier_operation,
            } = tier;

            let breaker = match self.manager.get(&name) {
                Ok(breaker) => breaker,
                Err(e) => {
                    tracing::error!(operation, tier = %name, error = %e, "Tier has no circuit breaker");
                    attempted.push(TierFailure {
                        tier: name,
                        error: TierError::UnknownTier,
                    });
                    continue;
                }
            };

            // Same error `call` would return, minus the rejection bookkeeping.
            if let Some(open) = breaker.peek_rejection() {
                tracing::debug!(
                    operation,
                    tier = %name,
                    retry_after = ?open.retry_after,
                    "Skipping tier with open circuit"
                );
                attempted.push(TierFailure {
                    tier: name,
                    error: TierError::Call(CallError::Open(open)),
                });
                continue;
            }

            match breaker.call(tier_operation).await {
                Ok(value) => {
                    if position > 0 {
                        tracing::info!(
                            operation,
                            tier = %name,
                            failed_tiers = attempted.len(),
                            "Served by fallback tier"
                        );
                    }
                    self.record_served(operation, &name);
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(operation, tier = %name, error = %error, "Tier failed, falling back");
                    attempted.push(TierFailure {
                        tier: name,
                        error: TierError::Call(error),
                    });
                }
            }
        }

        tracing::error!(
            event = "all_tiers_failed",
            operation,
            tiers = attempted.len(),
            "All tiers failed"
        );
        self.record_exhausted(operation);
        Err(AllTiersFailedError {
            operation: operation.to_string(),
            attempted,
        })
    }

    /// Like [`execute_with_fallback`](Self::execute_with_fallback), but answers
    /// with `default` instead of failing when every tier is exhausted.
    pub async fn execute_with_default<T, E>(
        &self,
        tiers: Vec<Tier<T, E>>,
        operation: &str,
        default: T,
    ) -> T
    where
        E: Display,
    {
        match self.execute_with_fallback(tiers, operation).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(operation, error = %e, "Serving default value, service degraded");
                default
            }
        }
    }

    pub fn stats(&self, operation: &str) -> Option<FallbackStats> {
        self.stats.get(operation).map(|s| s.value().clone())
    }

    pub fn all_stats(&self) -> BTreeMap<String, FallbackStats> {
        self.stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn record_served(&self, operation: &str, tier: &str) {
        let mut stats = self.stats.entry(operation.to_string()).or_default();
        stats.invocations += 1;
        *stats.served_by.entry(tier.to_string()).or_default() += 1;
        metrics::record_fallback_served(operation, tier);
    }

    fn record_exhausted(&self, operation: &str) {
        let mut stats = self.stats.entry(operation.to_string()).or_default();
        stats.invocations += 1;
        stats.exhausted += 1;
        metrics::record_fallback_exhausted(operation);
    }
}
