//! Shared utilities for integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tiered_resilience::config::BreakerConfig;

/// Breaker settings with the given thresholds and recovery timeout.
#[allow(dead_code)]
pub fn breaker_config(
    failure_threshold: u32,
    recovery_timeout_secs: u64,
    success_threshold: u32,
) -> BreakerConfig {
    BreakerConfig {
        failure_threshold,
        recovery_timeout_secs,
        half_open_max_calls: 1,
        success_threshold,
        window_size: 100,
    }
}

/// A programmable tier: answers from a script of outcomes, then falls back to
/// a default outcome once the script runs out. Counts every invocation.
#[derive(Clone)]
pub struct ScriptedTier {
    name: &'static str,
    script: Arc<Mutex<VecDeque<bool>>>,
    default_ok: bool,
    calls: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl ScriptedTier {
    pub fn healthy(name: &'static str) -> Self {
        Self::scripted(name, [], true)
    }

    pub fn failing(name: &'static str) -> Self {
        Self::scripted(name, [], false)
    }

    pub fn scripted(name: &'static str, script: impl IntoIterator<Item = bool>, default_ok: bool) -> Self {
        Self {
            name,
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            default_ok,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// One request against the tier.
    pub async fn request(&self) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ok = self.script.lock().pop_front().unwrap_or(self.default_ok);
        if ok {
            Ok(format!("{} ok", self.name))
        } else {
            Err(format!("{} down", self.name))
        }
    }
}
