use super::ServiceError;
use bulwark_retry::{
    with_service_retry, CancellationToken, ResourceKind, RetryError, RetryOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn cancelling_aborts_the_in_flight_attempt() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = with_service_retry(
        || async {
            // a long generation call
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<_, ServiceError>("image")
        },
        ResourceKind::ExternalService,
        RetryOptions::new().cancellation(token),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RetryError::Cancelled { attempts: 1, .. }));
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_backoff_stops_further_attempts() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    let calls = AtomicUsize::new(0);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let err = with_service_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ServiceError::Http(503))
        },
        ResourceKind::ExternalService,
        RetryOptions::new().max_attempts(5).cancellation(token),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_cancelled_token_prevents_the_first_attempt() {
    let token = CancellationToken::new();
    token.cancel();
    let calls = AtomicUsize::new(0);

    let err = with_service_retry(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ServiceError>(())
        },
        ResourceKind::ExternalService,
        RetryOptions::new().cancellation(token),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
