//! Active health checking.
//!
//! # Responsibilities
//! - Periodically run each tier's probe, bounded by the probe timeout
//! - Publish one aggregate snapshot per cycle
//! - Log tier health transitions once per change

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{HealthCheckConfig, InvalidConfigError};
use crate::health::state::{HealthSnapshot, TierHealth};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::manager::CircuitBreakerManager;
use crate::resilience::timeouts::with_timeout;

type Probe = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

struct RunningTask {
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

/// Background prober for tier liveness. Purely advisory.
pub struct HealthMonitor {
    config: HealthCheckConfig,
    probes: RwLock<BTreeMap<String, Probe>>,
    manager: Option<Arc<CircuitBreakerManager>>,
    snapshot: ArcSwap<HealthSnapshot>,
    /// Held for a whole probe cycle; each cycle folds into the previous one.
    cycle: tokio::sync::Mutex<()>,
    task: Mutex<Option<RunningTask>>,
}

impl HealthMonitor {
    /// Create a stopped monitor. Fails if `config` is out of range.
    pub fn new(config: HealthCheckConfig) -> Result<Self, InvalidConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            probes: RwLock::new(BTreeMap::new()),
            manager: None,
            snapshot: ArcSwap::from_pointee(HealthSnapshot::default()),
            cycle: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
        })
    }

    /// Report each tier's breaker state alongside its probe result.
    pub fn with_manager(mut self, manager: Arc<CircuitBreakerManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Add or replace the probe for `tier`. The probe resolves to `true` when
    /// the tier is reachable.
    pub fn register_probe<F, Fut>(&self, tier: impl Into<String>, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let probe: Probe = Arc::new(move || probe().boxed());
        self.probes.write().insert(tier.into(), probe);
    }

    pub fn unregister_probe(&self, tier: &str) -> bool {
        self.probes.write().remove(tier).is_some()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.snapshot.load_full()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Spawn the probe loop. Returns `false` if checks are disabled or the
    /// loop is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return false;
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::debug!("Health monitor already running");
            return false;
        }

        let shutdown = Shutdown::new();
        let receiver = shutdown.subscribe();
        let handle = tokio::spawn(self.clone().run(receiver));
        *task = Some(RunningTask { shutdown, handle });
        true
    }

    /// Stop the probe loop and wait for it to exit. Returns `false` if it was
    /// not running.
    pub async fn stop(&self) -> bool {
        let running = self.task.lock().take();
        let Some(running) = running else {
            return false;
        };

        running.shutdown.trigger();
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }
        true
    }

    /// Run one probe cycle now and return the snapshot it published.
    pub async fn check_now(&self) -> Arc<HealthSnapshot> {
        self.check_all().await;
        self.snapshot()
    }

    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            tiers = self.probes.read().len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check_all(&self) {
        let _cycle = self.cycle.lock().await;

        let probes: Vec<(String, Probe)> = self
            .probes
            .read()
            .iter()
            .map(|(name, probe)| (name.clone(), probe.clone()))
            .collect();

        let limit = self.config.probe_timeout();
        let results = join_all(probes.into_iter().map(|(tier, probe)| async move {
            let healthy = match with_timeout(limit, probe()).await {
                Ok(healthy) => healthy,
                Err(e) => {
                    tracing::warn!(tier = %tier, error = %e, "Health probe timed out");
                    false
                }
            };
            (tier, healthy)
        }))
        .await;

        let previous = self.snapshot.load();
        let checked_at = SystemTime::now();
        let mut tiers = BTreeMap::new();

        for (tier, healthy) in results {
            let before = previous.tiers.get(&tier);
            match before.map(|b| b.healthy) {
                Some(true) | None if !healthy => tracing::warn!(
                    event = "tier_unhealthy",
                    tier = %tier,
                    "Tier health check failing"
                ),
                Some(false) if healthy => tracing::info!(
                    event = "tier_recovered",
                    tier = %tier,
                    "Tier health check passing again"
                ),
                _ => {}
            }

            let mut entry = TierHealth::next(before, healthy, checked_at);
            entry.circuit_state = self
                .manager
                .as_ref()
                .and_then(|m| m.get(&tier).ok())
                .map(|breaker| breaker.state());

            metrics::record_tier_health(&tier, healthy);
            tiers.insert(tier, entry);
        }

        self.snapshot.store(Arc::new(HealthSnapshot {
            tiers,
            checked_at: Some(checked_at),
        }));
    }
}
