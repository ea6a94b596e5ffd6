use bulwark_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use std::sync::atomic::{AtomicUsize, Ordering};

fn failing_op(calls: &AtomicUsize) -> impl std::future::Future<Output = Result<(), &'static str>> + '_ {
    async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err("connection refused")
    }
}

#[tokio::test]
async fn fresh_breaker_is_closed_with_zero_counters() {
    let breaker = CircuitBreaker::new("fresh", CircuitBreakerConfig::default());
    let metrics = breaker.metrics();

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(metrics.failure_count, 0);
    assert_eq!(metrics.success_count, 0);
    assert_eq!(metrics.total_calls, 0);
}

#[tokio::test]
async fn two_failures_open_db_and_the_third_call_never_runs() {
    let breaker = CircuitBreaker::new(
        "db",
        CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        },
    );
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let err = breaker.execute(|| failing_op(&calls)).await.unwrap_err();
        assert_eq!(err.into_inner(), Some("connection refused"));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let err = breaker.execute(|| failing_op(&calls)).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(err.to_string(), "Circuit breaker db is OPEN");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fewer_failures_than_threshold_stay_closed() {
    let breaker = CircuitBreaker::builder("orders").failure_threshold(3).build();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let _ = breaker.execute(|| failing_op(&calls)).await;
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    // a success clears the consecutive count
    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    for _ in 0..2 {
        let _ = breaker.execute(|| failing_op(&calls)).await;
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.metrics().failure_count, 2);
}

#[tokio::test]
async fn execution_reports_what_happened() {
    let breaker = CircuitBreaker::builder("profile").build();
    let execution = breaker
        .execute(|| async { Ok::<_, &str>("bobblehead") })
        .await
        .unwrap();

    assert_eq!(execution.result, "bobblehead");
    assert!(execution.was_executed);
    assert!(!execution.was_rejected);
}

#[tokio::test]
async fn reset_closes_an_open_breaker() {
    let breaker = CircuitBreaker::builder("search").failure_threshold(1).build();
    let calls = AtomicUsize::new(0);
    let _ = breaker.execute(|| failing_op(&calls)).await;
    assert!(breaker.is_open());

    breaker.reset();

    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.failure_count, 0);
    assert_eq!(metrics.success_count, 0);
    assert!(breaker.call(|| async { Ok::<_, &str>(1) }).await.is_ok());
}

#[tokio::test]
async fn health_report_follows_state() {
    let breaker = CircuitBreaker::builder("cdn").failure_threshold(1).build();
    assert_eq!(breaker.health().http_status(), 200);
    assert_eq!(breaker.health().message, "Circuit healthy - 0% failure rate");

    let calls = AtomicUsize::new(0);
    let _ = breaker.execute(|| failing_op(&calls)).await;

    let health = breaker.health();
    assert!(!health.is_healthy);
    assert_eq!(health.http_status(), 503);
    assert_eq!(health.state, CircuitState::Open);
    assert!(health.message.starts_with("Circuit OPEN - failing fast. Next retry in"));
}
