//! Retry metrics regression tests

use super::helpers::*;
use bulwark_retry::{with_database_retry, with_service_retry, ResourceKind, RetryOptions};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
#[serial]
async fn retry_metrics_exist() {
    init_recorder();

    let calls = AtomicUsize::new(0);
    with_database_retry(
        || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("connection reset")
            } else {
                Ok(())
            }
        },
        RetryOptions::new()
            .operation_name("metrics_retry")
            .backoff(Duration::from_millis(1)),
    )
    .await
    .unwrap();

    assert_counter_exists("retry_calls_total");
    assert_metric_has_label("retry_calls_total", "retry", "metrics_retry");
    assert_metric_has_label("retry_calls_total", "outcome", "success");

    assert_counter_exists("retry_attempts_total");
    assert_metric_has_label("retry_attempts_total", "retry", "metrics_retry");
}

#[tokio::test]
#[serial]
async fn retry_failure_outcomes_are_labelled() {
    init_recorder();

    let _ = with_service_retry(
        || async { Err::<(), _>("network unreachable") },
        ResourceKind::ExternalService,
        RetryOptions::new()
            .operation_name("metrics_exhausted")
            .backoff(Duration::from_millis(1)),
    )
    .await;

    let _ = with_database_retry(
        || async { Err::<(), _>("permission denied for table users") },
        RetryOptions::new().operation_name("metrics_fatal"),
    )
    .await;

    assert_metric_has_label("retry_calls_total", "outcome", "exhausted");
    assert_metric_has_label("retry_calls_total", "outcome", "non_retryable");
    assert_metric_has_label("retry_calls_total", "retry", "metrics_fatal");
}
