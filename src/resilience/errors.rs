//! Error types for the resilience subsystem.
//!
//! Breakers and the retry policy never swallow an operation's own error: they
//! either pass it through ([`CallError::Operation`], [`RetryError`]) or replace
//! it with their own rejection when their policy, not the operation, refused
//! the call ([`CircuitOpenError`]).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub use crate::config::InvalidConfigError;

/// A breaker refused to attempt the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{circuit}' is open, retry after {retry_after:?}")]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call.
    pub circuit: String,
    /// Estimated time until the breaker admits a probe.
    pub retry_after: Duration,
}

/// Outcome of a call that went through a breaker.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Short-circuited; the operation was never invoked.
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The operation ran and failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> CallError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open(_))
    }

    /// The operation's own error, if it ran.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            CallError::Operation(e) => Some(e),
            CallError::Open(_) => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CallError::Operation(e) => Some(e),
            CallError::Open(_) => None,
        }
    }
}

/// Failure of an operation run under a retry policy.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every configured attempt failed.
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// An attempt failed with an error the caller marked as not retryable.
    #[error("attempt {attempt} failed with a non-retryable error: {error}")]
    Aborted { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }

    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Why a single tier in a fallback sequence did not produce a result.
#[derive(Debug, Error)]
pub enum TierError<E> {
    /// No breaker is registered under the tier's name.
    #[error("no circuit breaker registered for this tier")]
    UnknownTier,

    #[error("{0}")]
    Call(CallError<E>),
}

impl<E> TierError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, TierError::Call(CallError::Open(_)))
    }
}

/// One entry of [`AllTiersFailedError::attempted`].
#[derive(Debug)]
pub struct TierFailure<E> {
    pub tier: String,
    pub error: TierError<E>,
}

impl<E: fmt::Display> fmt::Display for TierFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.error)
    }
}

/// Every tier in a fallback sequence failed.
#[derive(Debug, Error)]
#[error("all {} tiers failed for '{operation}'", .attempted.len())]
pub struct AllTiersFailedError<E> {
    /// Label of the logical operation.
    pub operation: String,
    /// Failures in the order the tiers were attempted.
    pub attempted: Vec<TierFailure<E>>,
}

impl<E> AllTiersFailedError<E> {
    pub fn tier_names(&self) -> Vec<&str> {
        self.attempted.iter().map(|f| f.tier.as_str()).collect()
    }
}

/// Misuse of the breaker registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("no circuit breaker named '{0}'")]
    NotFound(String),

    #[error("circuit breaker '{0}' is already registered")]
    Duplicate(String),

    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfigError),
}
