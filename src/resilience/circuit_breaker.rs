//! Circuit breaker for tier protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: tier assumed down, calls fail fast
//! - Half-Open: a bounded number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after recovery_timeout (lazy, no timer)
//! Half-Open → Closed: half-open successes >= success_threshold
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - One breaker per tier, shared by every caller of that tier
//! - The lock guards bookkeeping only; the wrapped operation runs outside it
//! - Every state entry bumps an epoch; outcomes admitted under an older epoch
//!   are recorded in the window but cannot drive transitions
//! - Half-open slots are held by an RAII permit, so a cancelled probe frees its
//!   slot without counting as a success or a failure

use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::errors::{CallError, CircuitOpenError, InvalidConfigError};
use crate::resilience::window::OutcomeWindow;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub half_open_in_flight: u32,
    pub total_calls_in_window: usize,
    pub error_rate: f64,
    pub last_failure_time: Option<SystemTime>,
    /// Remaining recovery wait; `None` unless open.
    pub time_until_retry: Option<Duration>,
    pub total_trips: u64,
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    epoch: u64,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_calls: u32,
    window: OutcomeWindow,
    last_failure_time: Option<SystemTime>,
    last_state_change: Instant,
    total_trips: u64,
    rejected_calls: u64,
}

/// Per-tier circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

/// Admission ticket for one call. Releases its half-open slot on drop.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    probe: bool,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.probe {
            return;
        }
        let mut st = self.breaker.state.lock();
        // A transition since admission already zeroed the slot count.
        if st.epoch == self.epoch && st.state == CircuitState::HalfOpen {
            st.half_open_calls = st.half_open_calls.saturating_sub(1);
        }
    }
}

impl CircuitBreaker {
    /// Create a closed breaker. Fails if `config` is out of range.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self, InvalidConfigError> {
        config.validate()?;
        let name = name.into();
        metrics::record_state(&name, CircuitState::Closed);

        let state = BreakerState {
            state: CircuitState::Closed,
            epoch: 0,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_calls: 0,
            window: OutcomeWindow::new(config.window_size),
            last_failure_time: None,
            last_state_change: Instant::now(),
            total_trips: 0,
            rejected_calls: 0,
        };

        Ok(Self {
            name,
            config,
            state: Mutex::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. An open breaker whose recovery timeout has passed still
    /// reports `Open` until a call arrives.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`CallError::Open`] without invoking `operation` when the
    /// breaker is open, or half-open with every probe slot taken. Otherwise
    /// the operation's own result is returned, its error wrapped in
    /// [`CallError::Operation`].
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit()?;
        let outcome = operation().await;
        self.record(&permit, outcome.is_ok());
        drop(permit);
        outcome.map_err(CallError::Operation)
    }

    /// The rejection `call` would produce right now, without changing state.
    pub fn peek_rejection(&self) -> Option<CircuitOpenError> {
        let st = self.state.lock();
        self.rejection(&st, Instant::now())
    }

    /// Whether `call` would currently invoke its operation.
    pub fn is_call_permitted(&self) -> bool {
        self.peek_rejection().is_none()
    }

    /// Snapshot of counters and timings. Has no side effects.
    pub fn metrics(&self) -> BreakerMetrics {
        let st = self.state.lock();
        let time_until_retry = (st.state == CircuitState::Open).then(|| {
            let elapsed = Instant::now().saturating_duration_since(st.last_state_change);
            self.config.recovery_timeout().saturating_sub(elapsed)
        });

        BreakerMetrics {
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            half_open_successes: st.half_open_successes,
            half_open_in_flight: st.half_open_calls,
            total_calls_in_window: st.window.len(),
            error_rate: st.window.error_rate(),
            last_failure_time: st.last_failure_time,
            time_until_retry,
            total_trips: st.total_trips,
            rejected_calls: st.rejected_calls,
        }
    }

    /// Force the breaker closed and clear every counter, whatever its state.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        let previous = st.state;

        st.state = CircuitState::Closed;
        st.epoch = st.epoch.wrapping_add(1);
        st.consecutive_failures = 0;
        st.half_open_successes = 0;
        st.half_open_calls = 0;
        st.window.clear();
        st.last_failure_time = None;
        st.last_state_change = Instant::now();

        tracing::info!(
            event = "manual_reset",
            circuit = %self.name,
            previous_state = %previous,
            "Circuit breaker reset manually"
        );
        metrics::record_state(&self.name, CircuitState::Closed);
    }

    fn rejection(&self, st: &BreakerState, now: Instant) -> Option<CircuitOpenError> {
        match st.state {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let elapsed = now.saturating_duration_since(st.last_state_change);
                let recovery = self.config.recovery_timeout();
                (elapsed < recovery).then(|| CircuitOpenError {
                    circuit: self.name.clone(),
                    retry_after: recovery - elapsed,
                })
            }
            CircuitState::HalfOpen => {
                (st.half_open_calls >= self.config.half_open_max_calls).then(|| CircuitOpenError {
                    circuit: self.name.clone(),
                    retry_after: Duration::ZERO,
                })
            }
        }
    }

    fn admit(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        let mut st = self.state.lock();
        let now = Instant::now();

        if let Some(rejection) = self.rejection(&st, now) {
            st.rejected_calls += 1;
            metrics::record_rejection(&self.name);
            tracing::debug!(
                circuit = %self.name,
                state = %st.state,
                retry_after = ?rejection.retry_after,
                "Call rejected by open circuit"
            );
            return Err(rejection);
        }

        if st.state == CircuitState::Open {
            self.transition(&mut st, CircuitState::HalfOpen, now);
        }

        let probe = st.state == CircuitState::HalfOpen;
        if probe {
            st.half_open_calls += 1;
        }

        Ok(CallPermit {
            breaker: self,
            epoch: st.epoch,
            probe,
        })
    }

    fn record(&self, permit: &CallPermit<'_>, success: bool) {
        let mut st = self.state.lock();
        st.window.record(success);
        if !success {
            st.last_failure_time = Some(SystemTime::now());
        }

        if st.epoch != permit.epoch {
            tracing::debug!(
                circuit = %self.name,
                state = %st.state,
                success,
                "Ignoring outcome admitted before the last transition"
            );
            return;
        }

        let now = Instant::now();
        match (st.state, success) {
            (CircuitState::Closed, true) => {
                st.consecutive_failures = 0;
            }
            (CircuitState::Closed, false) => {
                st.consecutive_failures += 1;
                tracing::warn!(
                    event = "call_failed",
                    circuit = %self.name,
                    failure_count = st.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Call failed"
                );
                if st.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut st, CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, true) => {
                st.half_open_successes += 1;
                tracing::debug!(
                    circuit = %self.name,
                    successes = st.half_open_successes,
                    threshold = self.config.success_threshold,
                    "Probe succeeded"
                );
                if st.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut st, CircuitState::Closed, now);
                }
            }
            (CircuitState::HalfOpen, false) => {
                // The closed-state streak does not apply to probes.
                tracing::warn!(
                    event = "call_failed",
                    circuit = %self.name,
                    state = %CircuitState::HalfOpen,
                    half_open_successes = st.half_open_successes,
                    "Probe failed"
                );
                self.transition(&mut st, CircuitState::Open, now);
            }
            // Open admits nothing, so a same-epoch outcome cannot land here.
            (CircuitState::Open, _) => {}
        }
    }

    fn transition(&self, st: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = st.state;
        st.state = to;
        st.epoch = st.epoch.wrapping_add(1);
        st.last_state_change = now;
        st.half_open_successes = 0;
        st.half_open_calls = 0;

        match to {
            CircuitState::Open if from == CircuitState::Closed => {
                st.total_trips += 1;
                tracing::warn!(
                    event = "circuit_opened",
                    circuit = %self.name,
                    failure_count = st.consecutive_failures,
                    recovery_timeout_secs = self.config.recovery_timeout_secs,
                    previous_state = %from,
                    "Circuit breaker opened"
                );
            }
            CircuitState::Open => {
                st.total_trips += 1;
                tracing::warn!(
                    event = "circuit_opened",
                    circuit = %self.name,
                    recovery_timeout_secs = self.config.recovery_timeout_secs,
                    previous_state = %from,
                    "Circuit breaker reopened after a failed probe"
                );
            }
            CircuitState::HalfOpen => {
                tracing::info!(
                    event = "circuit_half_opened",
                    circuit = %self.name,
                    "Circuit breaker half-open, admitting probes"
                );
            }
            CircuitState::Closed => {
                st.consecutive_failures = 0;
                tracing::info!(
                    event = "circuit_closed",
                    circuit = %self.name,
                    previous_state = %from,
                    "Circuit breaker closed"
                );
            }
        }
        metrics::record_transition(&self.name, from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::collections::BTreeMap;
    use tokio::sync::oneshot;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;

    fn config(failure_threshold: u32, half_open_max_calls: u32, success_threshold: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold,
            recovery_timeout_secs: 10,
            half_open_max_calls,
            success_threshold,
            window_size: 100,
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let result: Result<(), _> = breaker.call(|| async { Err::<(), _>("down") }).await;
        assert!(result.is_err());
    }

    async fn succeed(breaker: &CircuitBreaker) {
        breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = CircuitBreaker::new("bad", config(0, 1, 1)).unwrap_err();
        assert_eq!(err.field, "failure_threshold");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_and_short_circuits() {
        let breaker = CircuitBreaker::new("primary", config(3, 1, 1)).unwrap();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result = breaker
                .call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("boom")
                })
                .await;
            assert!(matches!(result, Err(CallError::Operation("boom"))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        match result {
            Err(CallError::Open(err)) => {
                assert_eq!(err.circuit, "primary");
                assert_eq!(err.retry_after, Duration::from_secs(10));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new("primary", config(3, 1, 1)).unwrap();
        fail(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await;
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_transition() {
        let breaker = CircuitBreaker::new("primary", config(1, 1, 1)).unwrap();
        fail(&breaker).await;
        assert!(!breaker.is_call_permitted());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.is_call_permitted());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().rejected_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_call_cap() {
        let breaker = Arc::new(CircuitBreaker::new("primary", config(1, 1, 2)).unwrap());
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let (tx, rx) = oneshot::channel::<()>();
        let probe = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = rx.await;
                        Ok::<_, &str>(1)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.metrics().half_open_in_flight, 1);

        let second = breaker.call(|| async { Ok::<_, &str>(2) }).await;
        assert!(matches!(second, Err(CallError::Open(ref e)) if e.retry_after == Duration::ZERO));

        tx.send(()).unwrap();
        assert_eq!(probe.await.unwrap().unwrap(), 1);

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::HalfOpen);
        assert_eq!(metrics.half_open_successes, 1);
        assert_eq!(metrics.half_open_in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_releases_slot() {
        let breaker = Arc::new(CircuitBreaker::new("primary", config(1, 1, 1)).unwrap());
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let stuck = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| std::future::pending::<Result<(), &str>>())
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.metrics().half_open_in_flight, 1);

        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::HalfOpen);
        assert_eq!(metrics.half_open_in_flight, 0);
        assert_eq!(metrics.half_open_successes, 0);

        succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_probe_success_is_ignored_after_reopen() {
        let breaker = Arc::new(CircuitBreaker::new("primary", config(1, 2, 2)).unwrap());
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let (ok_tx, ok_rx) = oneshot::channel::<()>();
        let (err_tx, err_rx) = oneshot::channel::<()>();
        let good = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = ok_rx.await;
                        Ok::<_, &str>(())
                    })
                    .await
            })
        };
        let bad = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = err_rx.await;
                        Err::<(), _>("still down")
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.metrics().half_open_in_flight, 2);

        err_tx.send(()).unwrap();
        assert!(bad.await.unwrap().is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        ok_tx.send(()).unwrap();
        assert!(good.await.unwrap().is_ok());

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::Open);
        assert_eq!(metrics.half_open_successes, 0);
        assert_eq!(metrics.time_until_retry, Some(Duration::from_secs(10)));
        assert_eq!(metrics.total_trips, 2);
    }

    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<parking_lot::Mutex<Vec<BTreeMap<String, String>>>>);

    struct FieldRecorder<'a>(&'a mut BTreeMap<String, String>);

    impl Visit for FieldRecorder<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    impl<S: Subscriber> Layer<S> for CapturedEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = BTreeMap::new();
            event.record(&mut FieldRecorder(&mut fields));
            self.0.lock().push(fields);
        }
    }

    impl CapturedEvents {
        fn named(&self, name: &str) -> Vec<BTreeMap<String, String>> {
            self.0
                .lock()
                .iter()
                .filter(|f| f.get("event").map(String::as_str) == Some(name))
                .cloned()
                .collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_events_omit_closed_streak() {
        let events = CapturedEvents::default();
        let _guard = tracing_subscriber::registry()
            .with(events.clone())
            .set_default();

        let breaker = CircuitBreaker::new("primary", config(2, 1, 1)).unwrap();
        fail(&breaker).await;
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let opened = events.named("circuit_opened");
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[0]["failure_count"], "2");
        assert!(!opened[1].contains_key("failure_count"));
        assert_eq!(opened[1]["previous_state"], "half_open");

        let failed = events.named("call_failed");
        assert_eq!(failed.len(), 3);
        assert_eq!(failed[1]["failure_count"], "2");
        assert!(!failed[2].contains_key("failure_count"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reset() {
        let breaker = CircuitBreaker::new("primary", config(1, 1, 1)).unwrap();
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.consecutive_failures, 0);
        assert_eq!(metrics.total_calls_in_window, 0);
        assert!(metrics.last_failure_time.is_none());
        assert!(metrics.time_until_retry.is_none());

        succeed(&breaker).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_rate_tracks_window() {
        let breaker = CircuitBreaker::new(
            "primary",
            BreakerConfig {
                window_size: 4,
                ..config(10, 1, 1)
            },
        )
        .unwrap();

        fail(&breaker).await;
        succeed(&breaker).await;
        succeed(&breaker).await;
        succeed(&breaker).await;
        assert_eq!(breaker.metrics().error_rate, 0.25);

        succeed(&breaker).await;
        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls_in_window, 4);
        assert_eq!(metrics.error_rate, 0.0);
    }
}
