//! Unified error taxonomy for guarded operations.
//!
//! Each pattern crate has its own precise error type (`CircuitBreakerError`,
//! `RetryError`, `RateLimitExceeded`) and converts into [`ResilienceError`]
//! through a `From` impl, so a service or action layer can hold one error
//! type regardless of how many patterns were composed around the call.
//!
//! ```rust
//! use bulwark_core::{ResilienceError, UserFacing};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct QueryError;
//!
//! let err: ResilienceError<QueryError> = ResilienceError::CircuitOpen {
//!     name: "collections-db".to_string(),
//!     retry_in: Some(Duration::from_secs(12)),
//! };
//!
//! assert!(err.is_handled());
//! assert_eq!(err.user_facing(), UserFacing::TemporarilyUnavailable);
//! assert_eq!(err.user_facing().status_code(), 503);
//! ```
//!
//! # Already-handled errors
//!
//! Every variant except [`ResilienceError::Application`] was produced by the
//! resilience layer itself and already carries its classification.
//! [`ResilienceError::is_handled`] exposes that as a flag so outer layers
//! (action middleware, request handlers) pass these through untouched instead
//! of wrapping them a second time.

use std::fmt;
use std::time::Duration;

/// Errors surfaced by an operation guarded by breakers, retries or rate limits.
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The named breaker is open; the operation was not attempted.
    CircuitOpen {
        /// Breaker name.
        name: String,
        /// Time until the breaker admits a trial call, if known.
        retry_in: Option<Duration>,
    },

    /// A single call exceeded the breaker's per-call timeout.
    Timeout {
        /// Breaker name.
        name: String,
        /// Configured timeout.
        after: Duration,
    },

    /// Every allowed attempt failed with a retryable error.
    RetriesExhausted {
        /// Operation name used for telemetry.
        operation: String,
        /// Attempts made.
        attempts: usize,
        /// Time spent including backoff.
        elapsed: Duration,
        /// Error returned by the final attempt.
        source: E,
    },

    /// The caller cancelled the operation.
    Cancelled {
        /// Operation name used for telemetry.
        operation: String,
        /// Attempts started before cancellation.
        attempts: usize,
    },

    /// The actor exceeded the limit for this action.
    RateLimited {
        /// Counter value after this request.
        current_count: u64,
        /// Configured limit.
        limit: u64,
        /// Window length.
        window: Duration,
    },

    /// A guard was configured with values it cannot run with.
    Misconfigured(String),

    /// The operation itself failed with a non-retryable error.
    Application(E),
}

impl<E> fmt::Display for ResilienceError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::CircuitOpen { name, .. } => {
                write!(f, "Circuit breaker {} is OPEN", name)
            }
            ResilienceError::Timeout { name, after } => {
                write!(f, "{} timed out after {}ms", name, after.as_millis())
            }
            ResilienceError::RetriesExhausted {
                operation,
                attempts,
                elapsed,
                source,
            } => write!(
                f,
                "{} failed after {} attempts in {}ms: {}",
                operation,
                attempts,
                elapsed.as_millis(),
                source
            ),
            ResilienceError::Cancelled {
                operation,
                attempts,
            } => write!(f, "{} cancelled after {} attempts", operation, attempts),
            ResilienceError::RateLimited {
                current_count,
                limit,
                window,
            } => write!(
                f,
                "rate limit exceeded ({}/{} per {}s)",
                current_count,
                limit,
                window.as_secs()
            ),
            ResilienceError::Misconfigured(reason) => {
                write!(f, "invalid resilience configuration: {}", reason)
            }
            ResilienceError::Application(e) => write!(f, "{}", e),
        }
    }
}

impl<E> std::error::Error for ResilienceError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResilienceError::RetriesExhausted { source, .. } => Some(source),
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// True when a breaker rejected the call without trying it.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// True for a per-call timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// True when retries ran out.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetriesExhausted { .. })
    }

    /// True when the caller cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled { .. })
    }

    /// True for a rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ResilienceError::RateLimited { .. })
    }

    /// True when the error came straight from the operation.
    pub fn is_application(&self) -> bool {
        matches!(self, ResilienceError::Application(_))
    }

    /// True when the resilience layer already classified this error.
    ///
    /// Outer layers must not re-wrap handled errors.
    pub fn is_handled(&self) -> bool {
        !self.is_application()
    }

    /// Borrows the operation's own error, if there is one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::RetriesExhausted { source, .. } => Some(source),
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Extracts the operation's own error, if there is one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::RetriesExhausted { source, .. } => Some(source),
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the operation error type.
    ///
    /// ```
    /// use bulwark_core::ResilienceError;
    ///
    /// let err: ResilienceError<String> = ResilienceError::Application("boom".to_string());
    /// let mapped: ResilienceError<usize> = err.map_operation_error(|s| s.len());
    /// assert_eq!(mapped.into_operation_error(), Some(4));
    /// ```
    pub fn map_operation_error<F, T>(self, f: F) -> ResilienceError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ResilienceError::CircuitOpen { name, retry_in } => {
                ResilienceError::CircuitOpen { name, retry_in }
            }
            ResilienceError::Timeout { name, after } => ResilienceError::Timeout { name, after },
            ResilienceError::RetriesExhausted {
                operation,
                attempts,
                elapsed,
                source,
            } => ResilienceError::RetriesExhausted {
                operation,
                attempts,
                elapsed,
                source: f(source),
            },
            ResilienceError::Cancelled {
                operation,
                attempts,
            } => ResilienceError::Cancelled {
                operation,
                attempts,
            },
            ResilienceError::RateLimited {
                current_count,
                limit,
                window,
            } => ResilienceError::RateLimited {
                current_count,
                limit,
                window,
            },
            ResilienceError::Misconfigured(reason) => ResilienceError::Misconfigured(reason),
            ResilienceError::Application(e) => ResilienceError::Application(f(e)),
        }
    }

    /// Category a client should see for this error.
    pub fn user_facing(&self) -> UserFacing {
        match self {
            ResilienceError::CircuitOpen { .. }
            | ResilienceError::Timeout { .. }
            | ResilienceError::RetriesExhausted { .. } => UserFacing::TemporarilyUnavailable,
            ResilienceError::RateLimited { window, .. } => UserFacing::Throttled {
                retry_after: *window,
            },
            ResilienceError::Cancelled { .. }
            | ResilienceError::Misconfigured(_)
            | ResilienceError::Application(_) => UserFacing::Failed,
        }
    }
}

/// What a client is told when a guarded operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFacing {
    /// The backing resource is unhealthy; retrying later may work.
    TemporarilyUnavailable,
    /// The actor is sending too many requests and should wait.
    Throttled {
        /// Upper bound on how long to wait.
        retry_after: Duration,
    },
    /// The operation failed for a reason retrying will not fix.
    Failed,
}

impl UserFacing {
    /// Stable message suitable for a client.
    pub fn message(&self) -> &'static str {
        match self {
            UserFacing::TemporarilyUnavailable => {
                "The service is temporarily unavailable. Please try again shortly."
            }
            UserFacing::Throttled { .. } => {
                "Too many requests. Please wait before trying again."
            }
            UserFacing::Failed => "Something went wrong while processing the request.",
        }
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            UserFacing::TemporarilyUnavailable => "SERVICE_UNAVAILABLE",
            UserFacing::Throttled { .. } => "RATE_LIMIT_EXCEEDED",
            UserFacing::Failed => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            UserFacing::TemporarilyUnavailable => 503,
            UserFacing::Throttled { .. } => 429,
            UserFacing::Failed => 500,
        }
    }
}
