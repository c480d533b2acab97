//! Retry policy.
//!
//! # Responsibilities
//! - Re-run a failing operation up to `max_attempts` times in total
//! - Sleep an exponentially growing, optionally jittered delay between attempts
//! - Let callers mark errors as non-retryable
//!
//! # Design Decisions
//! - The policy is an immutable value; share it freely across call sites
//! - Configuration is validated when the policy is built, never per call
//! - `execute` retries every error; `execute_guarded` composes with a breaker
//!   and gives up immediately on an open circuit instead of spinning through
//!   attempts that would be rejected anyway

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::{apply_jitter, calculate_backoff};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::errors::{CallError, InvalidConfigError, RetryError};

/// Exponential-backoff retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    exponential_base: f64,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
        jitter: bool,
    ) -> Result<Self, InvalidConfigError> {
        if max_attempts == 0 {
            return Err(InvalidConfigError::new("max_attempts", "must be at least 1"));
        }
        if base_delay.is_zero() {
            return Err(InvalidConfigError::new("base_delay", "must be greater than 0"));
        }
        if max_delay < base_delay {
            return Err(InvalidConfigError::new(
                "max_delay",
                format!("{max_delay:?} is below base_delay ({base_delay:?})"),
            ));
        }
        if !exponential_base.is_finite() || exponential_base <= 1.0 {
            return Err(InvalidConfigError::new(
                "exponential_base",
                format!("{exponential_base} must be a finite number above 1"),
            ));
        }

        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            exponential_base,
            jitter,
        })
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self, InvalidConfigError> {
        config.validate()?;
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.exponential_base,
            config.jitter,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn jitter_enabled(&self) -> bool {
        self.jitter
    }

    /// Delay before retry number `retry` (0 = first retry), jitter included
    /// when enabled.
    pub fn delay(&self, retry: u32) -> Duration {
        let delay = calculate_backoff(retry, self.base_delay, self.max_delay, self.exponential_base);
        if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }

    /// The jitter-free schedule: one entry per wait, `max_attempts - 1` total.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| {
                calculate_backoff(retry, self.base_delay, self.max_delay, self.exponential_base)
            })
            .collect()
    }

    /// Run `operation`, retrying on every error.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(operation, |_| true).await
    }

    /// Run `operation`, retrying only errors for which `is_retryable` holds.
    /// Any other error ends the loop with [`RetryError::Aborted`].
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !is_retryable(&error) {
                tracing::debug!(attempt, error = %error, "Error is not retryable");
                return Err(RetryError::Aborted { attempt, error });
            }

            if attempt >= self.max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    error = %error,
                    "Retry attempts exhausted"
                );
                metrics::record_retry_exhausted();
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.delay(attempt - 1);
            tracing::info!(attempt, delay = ?delay, error = %error, "Retrying operation");
            metrics::record_retry();
            tokio::time::sleep(delay).await;
        }
    }

    /// Retry `operation` through `breaker`. An open circuit is not retried:
    /// the breaker's rejection comes back at once as [`RetryError::Aborted`].
    pub async fn execute_guarded<F, Fut, T, E>(
        &self,
        breaker: &CircuitBreaker,
        mut operation: F,
    ) -> Result<T, RetryError<CallError<E>>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(
            move || {
                let attempt = operation();
                breaker.call(move || attempt)
            },
            |error: &CallError<E>| !error.is_open(),
        )
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}
