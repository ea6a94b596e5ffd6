//! Per-attempt timeouts for the guarded `database` and `external_service`
//! paths.
//!
//! The breaker runs the whole retry loop, so its call timeout is applied to
//! each attempt here instead. A timed-out attempt is retryable like any other
//! timeout.

use bulwark_retry::FailureDetails;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Failure of a single attempt.
#[derive(Debug)]
pub(crate) enum AttemptError<E> {
    /// The operation returned an error.
    Failed(E),
    /// The attempt ran past the breaker's call timeout.
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Failed(err) => err.fmt(f),
            AttemptError::TimedOut(after) => {
                write!(f, "attempt timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl<E: FailureDetails> FailureDetails for AttemptError<E> {
    fn sql_state(&self) -> Option<&str> {
        match self {
            AttemptError::Failed(err) => err.sql_state(),
            AttemptError::TimedOut(_) => None,
        }
    }

    fn http_status(&self) -> Option<u16> {
        match self {
            AttemptError::Failed(err) => err.http_status(),
            AttemptError::TimedOut(_) => None,
        }
    }

    fn is_timeout(&self) -> bool {
        match self {
            AttemptError::Failed(err) => err.is_timeout(),
            AttemptError::TimedOut(_) => true,
        }
    }

    fn is_connection(&self) -> bool {
        match self {
            AttemptError::Failed(err) => err.is_connection(),
            AttemptError::TimedOut(_) => false,
        }
    }

    fn is_cancellation(&self) -> bool {
        match self {
            AttemptError::Failed(err) => err.is_cancellation(),
            AttemptError::TimedOut(_) => false,
        }
    }
}

/// Runs one attempt, failing it with [`AttemptError::TimedOut`] after `limit`.
pub(crate) async fn bounded<Fut, T, E>(
    attempt: Fut,
    limit: Option<Duration>,
) -> Result<T, AttemptError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result.map_err(AttemptError::Failed),
            Err(_) => Err(AttemptError::TimedOut(limit)),
        },
        None => attempt.await.map_err(AttemptError::Failed),
    }
}
