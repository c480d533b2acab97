//! Failure drills against simulated tiers.
//!
//! # Data Flow
//! ```text
//! DrillPlan (requests, concurrency, per-tier failure rate)
//!     → one SimulatedTier per name in fallback.order
//!     → per request: FallbackHandler over the tiers,
//!         each tier attempt = breaker.call(retry.execute(tier.request))
//!     → HealthMonitor probing the same tiers in the background
//!     → DrillReport (breaker metrics, fallback stats, health snapshot)
//! ```
//!
//! A drill stops early when the shutdown signal arrives; requests already in
//! flight are dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::ResilienceConfig;
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::resilience::circuit_breaker::BreakerMetrics;
use crate::resilience::errors::{InvalidConfigError, ManagerError};
use crate::resilience::fallback::{FallbackHandler, FallbackStats, Tier};
use crate::resilience::manager::CircuitBreakerManager;
use crate::resilience::retries::RetryPolicy;

const OPERATION: &str = "drill";

#[derive(Debug, Error)]
pub enum DrillError {
    #[error("invalid drill plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("invalid configuration: {0}")]
    Config(#[from] InvalidConfigError),
}

/// A simulated request failure.
#[derive(Debug, Clone, Error)]
#[error("tier '{tier}' failed request {request}")]
pub struct SimulatedFailure {
    pub tier: String,
    pub request: u64,
}

/// A fake tier that fails at a fixed rate after a fixed latency.
#[derive(Debug)]
pub struct SimulatedTier {
    name: String,
    fail_rate: f64,
    latency: Duration,
    calls: AtomicU64,
}

impl SimulatedTier {
    pub fn new(name: impl Into<String>, fail_rate: f64, latency: Duration) -> Self {
        Self {
            name: name.into(),
            fail_rate: fail_rate.clamp(0.0, 1.0),
            latency,
            calls: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Times `request` has been invoked, retries included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn request(&self, request: u64) -> Result<String, SimulatedFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if fastrand::f64() < self.fail_rate {
            Err(SimulatedFailure {
                tier: self.name.clone(),
                request,
            })
        } else {
            Ok(format!("{}#{request}", self.name))
        }
    }

    /// Health probe; fails at the same rate as requests.
    pub fn probe(&self) -> bool {
        fastrand::f64() >= self.fail_rate
    }
}

/// What a drill should do.
#[derive(Debug, Clone)]
pub struct DrillPlan {
    pub requests: u64,
    pub concurrency: usize,
    /// Failure probability per tier; tiers not listed never fail.
    pub fail_rates: BTreeMap<String, f64>,
    pub latency: Duration,
}

impl Default for DrillPlan {
    fn default() -> Self {
        Self {
            requests: 100,
            concurrency: 8,
            fail_rates: BTreeMap::new(),
            latency: Duration::from_millis(5),
        }
    }
}

/// Outcome of a drill.
#[derive(Debug, Clone, Serialize)]
pub struct DrillReport {
    pub requests: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub interrupted: bool,
    pub elapsed_ms: u64,
    /// Raw invocations per tier, retries included.
    pub tier_calls: BTreeMap<String, u64>,
    pub breakers: BTreeMap<String, BreakerMetrics>,
    pub fallback: FallbackStats,
    pub health: HealthSnapshot,
}

/// Run `plan` against tiers named by `config.fallback.order`.
pub async fn run_drill(
    config: &ResilienceConfig,
    plan: DrillPlan,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<DrillReport, DrillError> {
    let order = &config.fallback.order;
    for (tier, rate) in &plan.fail_rates {
        if !order.contains(tier) {
            return Err(DrillError::InvalidPlan(format!(
                "'{tier}' is not in fallback.order"
            )));
        }
        if !(0.0..=1.0).contains(rate) {
            return Err(DrillError::InvalidPlan(format!(
                "failure rate for '{tier}' must be within 0..=1, got {rate}"
            )));
        }
    }
    if plan.concurrency == 0 {
        return Err(DrillError::InvalidPlan("concurrency must be at least 1".into()));
    }

    let manager = Arc::new(CircuitBreakerManager::from_config(config)?);
    let policy = Arc::new(RetryPolicy::from_config(&config.retry)?);
    let handler = FallbackHandler::new(manager.clone());

    let tiers: Vec<Arc<SimulatedTier>> = order
        .iter()
        .map(|name| {
            let rate = plan.fail_rates.get(name).copied().unwrap_or(0.0);
            Arc::new(SimulatedTier::new(name.clone(), rate, plan.latency))
        })
        .collect();

    let monitor = Arc::new(HealthMonitor::new(config.health_check.clone())?.with_manager(manager.clone()));
    for tier in &tiers {
        let probed = tier.clone();
        monitor.register_probe(tier.name(), move || {
            let healthy = probed.probe();
            async move { healthy }
        });
    }
    monitor.start();

    tracing::info!(
        requests = plan.requests,
        concurrency = plan.concurrency,
        tiers = ?order,
        "Drill starting"
    );

    let started = Instant::now();
    let mut completed = 0;
    let mut succeeded = 0;
    let mut interrupted = false;

    let mut outcomes = stream::iter(0..plan.requests)
        .map(|id| {
            let sequence = tiers
                .iter()
                .map(|tier| {
                    let tier = tier.clone();
                    let policy = policy.clone();
                    Tier::new(tier.name().to_string(), move || async move {
                        policy.execute(|| tier.request(id)).await
                    })
                })
                .collect();
            handler.execute_with_fallback(sequence, OPERATION)
        })
        .buffer_unordered(plan.concurrency);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::warn!(completed, "Drill interrupted by shutdown signal");
                interrupted = true;
                break;
            }
            outcome = outcomes.next() => match outcome {
                Some(result) => {
                    completed += 1;
                    if result.is_ok() {
                        succeeded += 1;
                    }
                }
                None => break,
            },
        }
    }
    drop(outcomes);

    monitor.stop().await;
    let health = monitor.check_now().await;

    let report = DrillReport {
        requests: plan.requests,
        completed,
        succeeded,
        failed: completed - succeeded,
        interrupted,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        tier_calls: tiers
            .iter()
            .map(|t| (t.name().to_string(), t.calls()))
            .collect(),
        breakers: manager.all_metrics(),
        fallback: handler.stats(OPERATION).unwrap_or_default(),
        health: (*health).clone(),
    };

    tracing::info!(
        completed = report.completed,
        succeeded = report.succeeded,
        failed = report.failed,
        elapsed_ms = report.elapsed_ms,
        "Drill finished"
    );
    Ok(report)
}
