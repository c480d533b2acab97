//! Background health monitoring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiered_resilience::config::HealthCheckConfig;
use tiered_resilience::health::HealthMonitor;
use tiered_resilience::lifecycle::Shutdown;
use tokio::time;

mod common;

use common::ScriptedTier;

fn config(interval_secs: u64) -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: true,
        interval_secs,
        timeout_secs: 1,
    }
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_follows_tier_health() {
    let monitor = Arc::new(HealthMonitor::new(config(10)).unwrap());
    let up = Arc::new(AtomicBool::new(true));

    let flag = up.clone();
    monitor.register_probe("primary", move || {
        let flag = flag.clone();
        async move { flag.load(Ordering::SeqCst) }
    });
    let secondary = ScriptedTier::healthy("secondary");
    monitor.register_probe("secondary", move || {
        let tier = secondary.clone();
        async move { tier.request().await.is_ok() }
    });

    assert!(monitor.snapshot().tiers.is_empty());
    assert!(monitor.start());

    time::sleep(Duration::from_secs(1)).await;
    assert!(monitor.snapshot().all_healthy());

    up.store(false, Ordering::SeqCst);
    time::sleep(Duration::from_secs(10)).await;

    let snapshot = monitor.snapshot();
    assert!(!snapshot.all_healthy());
    assert!(!snapshot.tiers["primary"].healthy);
    assert_eq!(snapshot.tiers["primary"].consecutive_failures, 1);
    assert!(snapshot.tiers["secondary"].healthy);

    assert!(monitor.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_probe_leaves_snapshot() {
    let monitor = HealthMonitor::new(config(10)).unwrap();
    monitor.register_probe("primary", || async { true });
    monitor.register_probe("secondary", || async { true });
    assert_eq!(monitor.check_now().await.tiers.len(), 2);

    assert!(monitor.unregister_probe("secondary"));
    assert!(!monitor.unregister_probe("secondary"));

    let snapshot = monitor.check_now().await;
    assert_eq!(snapshot.tiers.keys().collect::<Vec<_>>(), vec!["primary"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_external_shutdown_wiring() {
    let monitor = Arc::new(HealthMonitor::new(config(5)).unwrap());
    monitor.register_probe("primary", || async { true });
    assert!(monitor.start());

    let shutdown = Shutdown::new();
    let mut signal = shutdown.subscribe();
    let stopper = {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            let _ = signal.recv().await;
            monitor.stop().await
        })
    };

    shutdown.trigger();
    assert!(stopper.await.unwrap());
    assert!(!monitor.is_running());

    // Restartable after a stop.
    assert!(monitor.start());
    assert!(monitor.stop().await);
}
