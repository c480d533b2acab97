//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open, by circuit
//! - `circuit_breaker_transitions_total` (counter): by circuit, from, to
//! - `circuit_breaker_rejected_total` (counter): short-circuited calls, by circuit
//! - `retry_attempts_total` (counter): retries scheduled
//! - `retry_exhausted_total` (counter): operations that ran out of attempts
//! - `fallback_served_total` (counter): successful invocations, by operation, tier
//! - `fallback_exhausted_total` (counter): invocations where every tier failed
//! - `tier_health` (gauge): 1=healthy, 0=unhealthy, by tier
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use std::net::SocketAddr;

use ::metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    }
}

pub fn record_transition(circuit: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "circuit_breaker_transitions_total",
        "circuit" => circuit.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_state(circuit, to);
}

pub fn record_state(circuit: &str, state: CircuitState) {
    gauge!("circuit_breaker_state", "circuit" => circuit.to_string()).set(state_value(state));
}

pub fn record_rejection(circuit: &str) {
    counter!("circuit_breaker_rejected_total", "circuit" => circuit.to_string()).increment(1);
}

pub fn record_retry() {
    counter!("retry_attempts_total").increment(1);
}

pub fn record_retry_exhausted() {
    counter!("retry_exhausted_total").increment(1);
}

pub fn record_fallback_served(operation: &str, tier: &str) {
    counter!(
        "fallback_served_total",
        "operation" => operation.to_string(),
        "tier" => tier.to_string()
    )
    .increment(1);
}

pub fn record_fallback_exhausted(operation: &str) {
    counter!("fallback_exhausted_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_tier_health(tier: &str, healthy: bool) {
    gauge!("tier_health", "tier" => tier.to_string()).set(if healthy { 1.0 } else { 0.0 });
}
