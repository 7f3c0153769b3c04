//! Errors surfaced by the executor.

use rebound_core::Severity;
use thiserror::Error;

/// Failure of a resilient call, generic over the operation's error `E`.
///
/// Callers can match the resilience variants separately from their own
/// domain errors, which come back untouched in [`ResilienceError::Inner`].
#[derive(Error, Debug)]
pub enum ResilienceError<E> {
    /// The circuit for `key` is open and no fallback is registered.
    ///
    /// `last_error` is set when this call's own failure tripped the
    /// circuit, and empty when the call was rejected without running.
    #[error("Circuit breaker open for {key}")]
    CircuitOpen { key: String, last_error: Option<E> },

    /// Every attempt failed while the circuit stayed closed.
    #[error("Failed after {attempts} attempts for {key}")]
    RetryExhausted {
        key: String,
        attempts: u32,
        last_error: E,
    },

    /// The caller cancelled before the next attempt could start.
    #[error("Cancelled after {attempts} attempts for {key}")]
    Cancelled { key: String, attempts: u32 },

    /// A non-retryable operation error, or a fallback's error, unmodified.
    #[error("{0}")]
    Inner(E),
}

impl<E> ResilienceError<E> {
    /// The circuit key, for resilience variants.
    pub fn key(&self) -> Option<&str> {
        match self {
            ResilienceError::CircuitOpen { key, .. }
            | ResilienceError::RetryExhausted { key, .. }
            | ResilienceError::Cancelled { key, .. } => Some(key),
            ResilienceError::Inner(_) => None,
        }
    }

    /// The operation error carried by this failure, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            ResilienceError::CircuitOpen { last_error, .. } => last_error.as_ref(),
            ResilienceError::RetryExhausted { last_error, .. } => Some(last_error),
            ResilienceError::Cancelled { .. } => None,
            ResilienceError::Inner(e) => Some(e),
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            ResilienceError::CircuitOpen { last_error, .. } => last_error,
            ResilienceError::RetryExhausted { last_error, .. } => Some(last_error),
            ResilienceError::Cancelled { .. } => None,
            ResilienceError::Inner(e) => Some(e),
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetryExhausted { .. })
    }

    /// How serious this failure is.
    pub fn severity(&self) -> Severity {
        match self {
            ResilienceError::CircuitOpen {
                last_error: Some(_),
                ..
            } => Severity::Critical,
            ResilienceError::CircuitOpen { last_error: None, .. } => Severity::Warning,
            ResilienceError::RetryExhausted { .. } => Severity::Error,
            ResilienceError::Cancelled { .. } => Severity::Warning,
            ResilienceError::Inner(_) => Severity::Error,
        }
    }
}
