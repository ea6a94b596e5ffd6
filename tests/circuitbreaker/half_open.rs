use bulwark_circuitbreaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
use std::time::Duration;

fn tripped(name: &str, successes: u32) -> CircuitBreaker {
    CircuitBreaker::builder(name)
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(30))
        .half_open_success_threshold(successes)
        .no_call_timeout()
        .build()
}

async fn fail(breaker: &CircuitBreaker) {
    let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
}

#[tokio::test(start_paused = true)]
async fn rejects_until_reset_timeout_then_admits_a_trial() {
    let breaker = tripped("queue", 1);
    fail(&breaker).await;

    tokio::time::advance(Duration::from_secs(29)).await;
    let err = breaker
        .call(|| async { Ok::<_, &str>(()) })
        .await
        .unwrap_err();
    assert!(err.is_circuit_open());

    tokio::time::advance(Duration::from_secs(1)).await;
    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn closing_needs_the_configured_number_of_successes() {
    let breaker = tripped("email", 2);
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn a_failed_trial_reopens() {
    let breaker = tripped("pubsub", 2);
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    fail(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.metrics().next_retry_in.is_some());
}

#[tokio::test(start_paused = true)]
async fn one_trial_at_a_time_by_default() {
    let breaker = tripped("storage", 1);
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let (release, wait) = tokio::sync::oneshot::channel::<()>();
    let trial_breaker = breaker.clone();
    let trial = tokio::spawn(async move {
        trial_breaker
            .call(|| async move {
                let _ = wait.await;
                Ok::<_, &str>(())
            })
            .await
    });
    tokio::task::yield_now().await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let err = breaker
        .call(|| async { Ok::<_, &str>(()) })
        .await
        .unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(err.to_string(), "Circuit breaker storage is OPEN");
    assert!(matches!(
        err,
        CircuitBreakerError::Open { retry_in: None, .. }
    ));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    release.send(()).unwrap();
    trial.await.unwrap().unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn a_dropped_trial_frees_its_slot() {
    let breaker = tripped("thumbnails", 1);
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        breaker.call(|| std::future::pending::<Result<(), &str>>()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(breaker.metrics().trials_in_flight, 0);

    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn wider_trial_window_admits_concurrent_probes() {
    let breaker = CircuitBreaker::builder("batch")
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(5))
        .half_open_max_trials(2)
        .half_open_success_threshold(2)
        .no_call_timeout()
        .build();
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(5)).await;

    let slow = |b: CircuitBreaker| async move {
        b.call(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, &str>(())
        })
        .await
    };
    let (first, second) = tokio::join!(slow(breaker.clone()), slow(breaker.clone()));
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
}
