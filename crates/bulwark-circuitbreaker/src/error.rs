use bulwark_core::ResilienceError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a guarded call.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open, or half-open with every trial slot taken; the
    /// operation was not invoked. Both read `is OPEN`, and a saturated
    /// half-open breaker leaves `retry_in` unset.
    #[error("Circuit breaker {name} is OPEN")]
    Open {
        /// Breaker name.
        name: String,
        /// Time until a trial call is admitted, when known.
        retry_in: Option<Duration>,
    },

    /// The operation exceeded the breaker's call timeout.
    #[error("Circuit breaker {name}: operation timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Breaker name.
        name: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The operation ran and returned an error.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the call was rejected without being attempted.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// True when the call timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitBreakerError::Timeout { .. })
    }

    /// Borrows the operation's error.
    pub fn inner(&self) -> Option<&E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Extracts the operation's error.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<CircuitBreakerError<E>> for ResilienceError<E> {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::Open { name, retry_in } => {
                ResilienceError::CircuitOpen { name, retry_in }
            }
            CircuitBreakerError::Timeout { name, timeout } => ResilienceError::Timeout {
                name,
                after: timeout,
            },
            CircuitBreakerError::Inner(e) => ResilienceError::Application(e),
        }
    }
}
