use bulwark_circuitbreaker::{CircuitBreakerRegistry, CircuitState};

async fn trip(registry: &CircuitBreakerRegistry, name: &str) {
    let breaker = registry.fast_breaker(name);
    for _ in 0..breaker.config().failure_threshold {
        let _ = breaker.call(|| async { Err::<(), _>("timeout") }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[test]
fn empty_registry_is_fully_healthy() {
    let stats = CircuitBreakerRegistry::new().stats();
    assert_eq!(stats.breakers_count, 0);
    assert_eq!(stats.overall_health_percentage, 100);
}

#[tokio::test]
async fn stats_count_open_breakers_as_unhealthy() {
    let registry = CircuitBreakerRegistry::new();
    registry.database_breaker("users");
    registry.database_breaker("orders");
    registry.external_service_breaker("email");
    trip(&registry, "cache").await;

    let stats = registry.stats();
    assert_eq!(stats.breakers_count, 4);
    assert_eq!(stats.health_summary.healthy, 3);
    assert_eq!(stats.health_summary.unhealthy, 1);
    assert_eq!(stats.health_summary.open, 1);
    assert_eq!(stats.health_summary.total, 4);
    assert_eq!(stats.overall_health_percentage, 75);
    assert!(registry.has_unhealthy_breakers());
}

#[tokio::test]
async fn reset_all_breakers_closes_everything() {
    let registry = CircuitBreakerRegistry::new();
    trip(&registry, "a").await;
    trip(&registry, "b").await;

    registry.reset_all_breakers();

    assert!(registry
        .health_statuses()
        .iter()
        .all(|health| health.state == CircuitState::Closed));
    assert_eq!(registry.stats().overall_health_percentage, 100);
}

#[tokio::test]
async fn reset_one_breaker_by_name() {
    let registry = CircuitBreakerRegistry::new();
    trip(&registry, "thumbnails").await;

    assert!(registry.reset_breaker("thumbnails"));
    assert!(!registry.reset_breaker("missing"));
    assert_eq!(registry.get("thumbnails").unwrap().state(), CircuitState::Closed);
}
