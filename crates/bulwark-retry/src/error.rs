use bulwark_core::ResilienceError;
use std::time::Duration;
use thiserror::Error;

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("{operation} failed after {attempts} attempts in {}ms: {source}", .elapsed.as_millis())]
    Exhausted {
        operation: String,
        attempts: usize,
        elapsed: Duration,
        source: E,
    },

    /// An attempt failed with an error the policy does not retry.
    #[error("{operation} failed with a non-retryable error: {source}")]
    NonRetryable {
        operation: String,
        attempts: usize,
        elapsed: Duration,
        source: E,
    },

    /// The cancellation token fired before the operation succeeded.
    #[error("{operation} cancelled after {attempts} attempts")]
    Cancelled {
        operation: String,
        attempts: usize,
        elapsed: Duration,
    },

    /// The configuration cannot run (for example `max_attempts == 0`).
    #[error("invalid retry configuration for {operation}: {reason}")]
    InvalidConfig { operation: String, reason: String },
}

impl<E> RetryError<E> {
    /// Attempts actually started.
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::NonRetryable { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
            RetryError::InvalidConfig { .. } => 0,
        }
    }

    /// True when retries ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// True when the error was classified as fatal.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// True when the caller cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Borrows the last attempt's error.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Extracts the last attempt's error.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

impl<E> From<RetryError<E>> for ResilienceError<E> {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted {
                operation,
                attempts,
                elapsed,
                source,
            } => ResilienceError::RetriesExhausted {
                operation,
                attempts,
                elapsed,
                source,
            },
            RetryError::NonRetryable { source, .. } => ResilienceError::Application(source),
            RetryError::Cancelled {
                operation,
                attempts,
                ..
            } => ResilienceError::Cancelled {
                operation,
                attempts,
            },
            RetryError::InvalidConfig { operation, reason } => {
                ResilienceError::Misconfigured(format!("{operation}: {reason}"))
            }
        }
    }
}
