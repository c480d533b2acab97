//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Un-jittered delay before retry number `retry` (0 = first retry):
/// `min(base * exponential_base^retry, max)`.
pub fn calculate_backoff(retry: u32, base: Duration, max: Duration, exponential_base: f64) -> Duration {
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let nanos = base.as_nanos() as f64 * exponential_base.powi(exponent);

    if nanos.is_nan() || nanos >= max.as_nanos() as f64 {
        return max;
    }
    if nanos < u64::MAX as f64 {
        Duration::from_nanos(nanos.round() as u64)
    } else {
        Duration::try_from_secs_f64(nanos / 1e9).unwrap_or(max)
    }
}

/// Scale `delay` by a uniform random factor in [0.5, 1.5), saturating at
/// `Duration::MAX`.
pub fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
