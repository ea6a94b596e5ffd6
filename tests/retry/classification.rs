use super::ServiceError;
use bulwark_retry::{with_database_retry, with_service_retry, ResourceKind, RetryOptions};
use std::sync::atomic::{AtomicUsize, Ordering};

async fn database_attempts(error: ServiceError) -> usize {
    let calls = AtomicUsize::new(0);
    let _ = with_database_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(error.clone())
        },
        RetryOptions::new(),
    )
    .await;
    calls.load(Ordering::SeqCst)
}

async fn service_attempts(error: ServiceError) -> usize {
    let calls = AtomicUsize::new(0);
    let _ = with_service_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(error.clone())
        },
        ResourceKind::ExternalService,
        RetryOptions::new().max_attempts(3),
    )
    .await;
    calls.load(Ordering::SeqCst)
}

#[tokio::test(start_paused = true)]
async fn constraint_violations_fail_after_one_attempt() {
    assert_eq!(database_attempts(ServiceError::Sql("23505")).await, 1);
    assert_eq!(database_attempts(ServiceError::Sql("22P02")).await, 1);
    assert_eq!(database_attempts(ServiceError::Sql("42703")).await, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_database_errors_are_retried() {
    assert_eq!(database_attempts(ServiceError::Sql("40P01")).await, 3);
    assert_eq!(database_attempts(ServiceError::Sql("40001")).await, 3);
    assert_eq!(database_attempts(ServiceError::Sql("53300")).await, 3);
    assert_eq!(
        database_attempts(ServiceError::Message("connection terminated unexpectedly")).await,
        3
    );
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried_but_server_errors_are() {
    assert_eq!(service_attempts(ServiceError::Http(404)).await, 1);
    assert_eq!(service_attempts(ServiceError::Http(422)).await, 1);
    assert_eq!(service_attempts(ServiceError::Http(429)).await, 3);
    assert_eq!(service_attempts(ServiceError::Http(502)).await, 3);
    assert_eq!(
        service_attempts(ServiceError::Message("fetch failed")).await,
        3
    );
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_is_reported_as_such() {
    let err = with_database_retry(
        || async { Err::<(), _>(ServiceError::Sql("23505")) },
        RetryOptions::new(),
    )
    .await
    .unwrap_err();

    assert!(err.is_non_retryable());
    assert_eq!(err.attempts(), 1);
}
