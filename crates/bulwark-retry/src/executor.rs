use crate::classify::{FailureDetails, ResourceKind};
use crate::config::{RetryConfig, RetryOptions};
use crate::error::RetryError;
use crate::events::RetryEvent;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Successful outcome of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryResult<T> {
    /// Value returned by the successful attempt.
    pub result: T,
    /// Attempts made, the successful one included.
    pub attempts: usize,
    /// `attempts > 1`.
    pub was_retried: bool,
    /// Wall time including backoff.
    pub total_time: Duration,
    /// One entry per attempt, in order.
    pub attempt_details: Vec<AttemptDetail>,
}

/// Timing of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDetail {
    /// 1-based attempt number.
    pub attempt: usize,
    /// Backoff scheduled after this attempt, if it was retried.
    pub delay: Option<Duration>,
    /// Time spent inside the operation.
    pub duration: Duration,
    /// The attempt returned `Ok`.
    pub succeeded: bool,
}

/// Runs `operation` until it succeeds, fails fatally, runs out of attempts
/// or is cancelled.
///
/// ```rust
/// use bulwark_retry::{with_retry, RetryConfig};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config: RetryConfig<String> = RetryConfig::builder()
///     .max_attempts(3)
///     .fixed_backoff(Duration::from_millis(1))
///     .build();
///
/// let calls = AtomicUsize::new(0);
/// let outcome = with_retry(
///     || async {
///         if calls.fetch_add(1, Ordering::SeqCst) == 0 {
///             Err("connection reset".to_string())
///         } else {
///             Ok(7)
///         }
///     },
///     &config,
/// )
/// .await
/// .unwrap();
///
/// assert_eq!(outcome.result, 7);
/// assert_eq!(outcome.attempts, 2);
/// assert!(outcome.was_retried);
/// # }
/// ```
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig<E>,
) -> Result<RetryResult<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = config.policy.max_attempts;
    if max_attempts == 0 {
        return Err(RetryError::InvalidConfig {
            operation: config.name.clone(),
            reason: "max_attempts must be at least 1".to_string(),
        });
    }

    let started = Instant::now();
    let mut attempt_details = Vec::with_capacity(max_attempts.min(8));
    let mut attempt = 0;

    loop {
        if is_cancelled(config.cancellation.as_ref()) {
            return Err(cancelled(config, attempt, started));
        }
        attempt += 1;

        let attempt_started = Instant::now();
        let outcome = match &config.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = operation() => Some(result),
            },
            None => Some(operation().await),
        };
        let duration = attempt_started.elapsed();

        let Some(result) = outcome else {
            return Err(cancelled(config, attempt, started));
        };

        match result {
            Ok(result) => {
                attempt_details.push(AttemptDetail {
                    attempt,
                    delay: None,
                    duration,
                    succeeded: true,
                });
                config.event_listeners.emit(&RetryEvent::Success {
                    pattern_name: config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    attempts: attempt,
                });

                #[cfg(feature = "metrics")]
                metrics::counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "success")
                    .increment(1);

                return Ok(RetryResult {
                    result,
                    attempts: attempt,
                    was_retried: attempt > 1,
                    total_time: started.elapsed(),
                    attempt_details,
                });
            }
            Err(error) => {
                if !config.policy.should_retry(&error) {
                    config.event_listeners.emit(&RetryEvent::IgnoredError {
                        pattern_name: config.name.clone(),
                        timestamp: std::time::Instant::now(),
                        attempts: attempt,
                    });

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        operation = %config.name,
                        attempt,
                        error = %error,
                        "non-retryable error"
                    );

                    #[cfg(feature = "metrics")]
                    metrics::counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "non_retryable")
                        .increment(1);

                    return Err(RetryError::NonRetryable {
                        operation: config.name.clone(),
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        source: error,
                    });
                }

                if attempt >= max_attempts {
                    config.event_listeners.emit(&RetryEvent::Error {
                        pattern_name: config.name.clone(),
                        timestamp: std::time::Instant::now(),
                        attempts: attempt,
                    });

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        operation = %config.name,
                        attempts = attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %error,
                        "retries exhausted"
                    );

                    #[cfg(feature = "metrics")]
                    metrics::counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "exhausted")
                        .increment(1);

                    return Err(RetryError::Exhausted {
                        operation: config.name.clone(),
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        source: error,
                    });
                }

                let delay = config.policy.next_backoff(attempt);
                attempt_details.push(AttemptDetail {
                    attempt,
                    delay: Some(delay),
                    duration,
                    succeeded: false,
                });
                config.event_listeners.emit(&RetryEvent::Retry {
                    pattern_name: config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    attempt,
                    delay,
                });

                #[cfg(feature = "tracing")]
                log_retry(config, attempt, delay, &error);

                #[cfg(feature = "metrics")]
                metrics::counter!("retry_attempts_total", "retry" => config.name.clone())
                    .increment(1);

                let slept = match &config.cancellation {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => false,
                        _ = tokio::time::sleep(delay) => true,
                    },
                    None => {
                        tokio::time::sleep(delay).await;
                        true
                    }
                };
                if !slept {
                    return Err(cancelled(config, attempt, started));
                }
            }
        }
    }
}

/// [`with_retry`] with the database preset: 3 attempts, 200ms base delay,
/// 2s cap, database error classification.
pub async fn with_database_retry<F, Fut, T, E>(
    operation: F,
    options: RetryOptions,
) -> Result<RetryResult<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: FailureDetails + 'static,
{
    let config = RetryConfig::database(&options);
    with_retry(operation, &config).await
}

/// [`with_retry`] with the external-service preset: 2 attempts, 1s base
/// delay, 10s cap, classification for `kind`, warning per retry.
pub async fn with_service_retry<F, Fut, T, E>(
    operation: F,
    kind: ResourceKind,
    options: RetryOptions,
) -> Result<RetryResult<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: FailureDetails + 'static,
{
    let config = RetryConfig::service(kind, &options);
    with_retry(operation, &config).await
}

fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}

fn cancelled<E>(config: &RetryConfig<E>, attempts: usize, started: Instant) -> RetryError<E> {
    config.event_listeners.emit(&RetryEvent::Cancelled {
        pattern_name: config.name.clone(),
        timestamp: std::time::Instant::now(),
        attempts,
    });

    #[cfg(feature = "tracing")]
    tracing::debug!(operation = %config.name, attempts, "retry loop cancelled");

    #[cfg(feature = "metrics")]
    metrics::counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "cancelled")
        .increment(1);

    RetryError::Cancelled {
        operation: config.name.clone(),
        attempts,
        elapsed: started.elapsed(),
    }
}

#[cfg(feature = "tracing")]
fn log_retry<E: Display>(config: &RetryConfig<E>, attempt: usize, delay: Duration, error: &E) {
    let max_attempts = config.policy.max_attempts;
    let delay_ms = delay.as_millis() as u64;
    if config.warn_on_retry {
        tracing::warn!(
            operation = %config.name,
            attempt = attempt + 1,
            max_attempts,
            delay_ms,
            error = %error,
            "retrying after failure"
        );
    } else {
        tracing::debug!(
            operation = %config.name,
            attempt = attempt + 1,
            max_attempts,
            delay_ms,
            error = %error,
            "retrying after failure"
        );
    }
}
