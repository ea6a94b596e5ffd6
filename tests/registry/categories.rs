use bulwark_circuitbreaker::{
    BreakerCategory, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    RegistryConfig,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn same_name_returns_the_identical_breaker() {
    let registry = CircuitBreakerRegistry::new();
    let first = registry.database_breaker("collections-db");
    let second = registry.database_breaker("collections-db");
    assert!(CircuitBreaker::ptr_eq(&first, &second));

    // a failure through one handle is visible through the other
    let tripped = registry.breaker_with(
        "one-strike",
        CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::fast()
        },
    );
    let _ = tripped.call(|| async { Err::<(), _>("down") }).await;
    assert_eq!(
        registry.fast_breaker("one-strike").state(),
        CircuitState::Open
    );
}

#[test]
fn categories_apply_their_profiles() {
    let registry = CircuitBreakerRegistry::new();

    let database = registry.database_breaker("users");
    let external = registry.external_service_breaker("email");
    let fast = registry.fast_breaker("rate-limit-counters");
    let upload = registry.upload_breaker("image-cdn");

    assert_eq!(database.config().failure_threshold, 5);
    assert_eq!(database.config().reset_timeout, Duration::from_secs(30));
    assert_eq!(external.config().reset_timeout, Duration::from_secs(60));
    assert_eq!(fast.config().failure_threshold, 3);
    assert_eq!(upload.config().call_timeout, Some(Duration::from_secs(60)));

    // fast breakers trip sooner than database breakers
    assert!(fast.config().failure_threshold < database.config().failure_threshold);
}

#[test]
fn first_category_wins_for_a_name() {
    let registry = CircuitBreakerRegistry::new();
    let fast = registry.fast_breaker("shared");
    let again = registry.breaker(BreakerCategory::Database, "shared");

    assert!(CircuitBreaker::ptr_eq(&fast, &again));
    assert_eq!(again.config(), &CircuitBreakerConfig::fast());
}

#[test]
fn configured_profiles_replace_defaults() {
    let registry = CircuitBreakerRegistry::with_config(RegistryConfig {
        database: CircuitBreakerConfig {
            failure_threshold: 10,
            ..CircuitBreakerConfig::database()
        },
        ..RegistryConfig::default()
    });

    assert_eq!(registry.database_breaker("db").config().failure_threshold, 10);
}

#[tokio::test]
async fn registry_is_shared_across_tasks() {
    let registry = Arc::new(CircuitBreakerRegistry::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.external_service_breaker("payments") })
        })
        .collect();

    let mut breakers = Vec::new();
    for handle in handles {
        breakers.push(handle.await.unwrap());
    }

    assert_eq!(registry.len(), 1);
    assert!(breakers
        .windows(2)
        .all(|pair| CircuitBreaker::ptr_eq(&pair[0], &pair[1])));
}
