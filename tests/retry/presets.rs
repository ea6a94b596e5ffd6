use super::ServiceError;
use bulwark_retry::{with_database_retry, with_service_retry, ResourceKind, RetryOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn database_preset_succeeds_after_transient_failures() {
    let calls = AtomicUsize::new(0);

    let outcome = with_database_retry(
        || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::Sql("08006"))
            } else {
                Ok("row")
            }
        },
        RetryOptions::new().operation_name("load-user"),
    )
    .await
    .unwrap();

    assert_eq!(outcome.result, "row");
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.was_retried);
    // 200ms then 400ms
    assert_eq!(outcome.total_time, Duration::from_millis(600));
    let delays: Vec<_> = outcome
        .attempt_details
        .iter()
        .map(|detail| detail.delay)
        .collect();
    assert_eq!(
        delays,
        vec![
            Some(Duration::from_millis(200)),
            Some(Duration::from_millis(400)),
            None
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn always_failing_operation_runs_exactly_max_attempts() {
    let calls = AtomicUsize::new(0);

    let err = with_database_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ServiceError::Message("deadlock detected"))
        },
        RetryOptions::new().operation_name("update-inventory"),
    )
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 3);
    assert_eq!(
        err.last_error(),
        Some(&ServiceError::Message("deadlock detected"))
    );
    assert!(err
        .to_string()
        .starts_with("update-inventory failed after 3 attempts in 600ms"));
}

#[tokio::test(start_paused = true)]
async fn service_preset_makes_two_attempts_one_second_apart() {
    let calls = AtomicUsize::new(0);
    let started = tokio::time::Instant::now();

    let err = with_service_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ServiceError::Http(503))
        },
        ResourceKind::ExternalService,
        RetryOptions::new(),
    )
    .await
    .unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn options_override_the_preset() {
    let calls = AtomicUsize::new(0);

    let err = with_service_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ServiceError::Message("network unreachable"))
        },
        ResourceKind::ExternalService,
        RetryOptions::new()
            .max_attempts(5)
            .backoff(Duration::from_millis(10))
            .max_backoff(Duration::from_millis(30)),
    )
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(err.attempts(), 5);
}

#[tokio::test]
async fn zero_attempts_is_a_configuration_error() {
    let err = with_database_retry(
        || async { Ok::<_, ServiceError>(()) },
        RetryOptions::new().max_attempts(0),
    )
    .await
    .unwrap_err();

    assert_eq!(err.attempts(), 0);
    assert!(!err.is_exhausted());
}
