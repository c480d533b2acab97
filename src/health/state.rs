//! Tier health snapshot.
//!
//! # Design Decisions
//! - A snapshot is immutable once published; each probe cycle builds a new one
//! - Health is advisory and never consulted by breakers or fallback

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::Serialize;

use crate::resilience::circuit_breaker::CircuitState;

/// Latest probe result for one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierHealth {
    pub healthy: bool,
    pub last_checked_at: SystemTime,
    /// Failed probes in a row; 0 once a probe succeeds.
    pub consecutive_failures: u32,
    /// The tier breaker's state at probe time, when a manager is attached.
    pub circuit_state: Option<CircuitState>,
}

impl TierHealth {
    /// Fold one probe result into the previous entry for the same tier.
    pub(crate) fn next(previous: Option<&TierHealth>, healthy: bool, checked_at: SystemTime) -> Self {
        let consecutive_failures = match (healthy, previous) {
            (true, _) => 0,
            (false, Some(prev)) => prev.consecutive_failures.saturating_add(1),
            (false, None) => 1,
        };

        Self {
            healthy,
            last_checked_at: checked_at,
            consecutive_failures,
            circuit_state: None,
        }
    }
}

/// Aggregate health across all probed tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub tiers: BTreeMap<String, TierHealth>,
    /// When the cycle that produced this snapshot finished; `None` before the
    /// first cycle.
    pub checked_at: Option<SystemTime>,
}

impl HealthSnapshot {
    /// True when every probed tier is healthy. Vacuously true before any probe.
    pub fn all_healthy(&self) -> bool {
        self.tiers.values().all(|t| t.healthy)
    }

    pub fn get(&self, tier: &str) -> Option<&TierHealth> {
        self.tiers.get(tier)
    }

    pub fn unhealthy_tiers(&self) -> Vec<&str> {
        self.tiers
            .iter()
            .filter(|(_, t)| !t.healthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
