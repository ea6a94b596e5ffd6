use super::{DownStore, ExpiryOutageStore};
use bulwark_circuitbreaker::{CircuitBreakerRegistry, CircuitState};
use bulwark_ratelimiter::{
    rate_limit_key, RateLimitDecision, RateLimitPolicy, RateLimiter, STORE_BREAKER_NAME,
};
use bulwark_retry::RetryOptions;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn unreachable_store_lets_requests_through() {
    let store = Arc::new(DownStore::default());
    let failed_open = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failed_open);

    let limiter = RateLimiter::builder_shared(store.clone())
        .on_failed_open(move |_key, _error| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let policy = RateLimitPolicy::per_seconds(1, 60);

    for _ in 0..3 {
        let decision = limiter
            .check_action("user_1", "vote", &policy)
            .await
            .unwrap();
        assert!(decision.is_failed_open());
    }

    assert_eq!(failed_open.load(Ordering::SeqCst), 3);
    // two attempts per check
    assert_eq!(store.incr_calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn breaker_opens_and_skips_the_store() {
    let registry = CircuitBreakerRegistry::new();
    let store = Arc::new(DownStore::default());
    let limiter = RateLimiter::builder_shared(store.clone())
        .registry(&registry)
        .retry_options(
            RetryOptions::new()
                .max_attempts(1)
                .backoff(Duration::from_millis(1)),
        )
        .build();
    let policy = RateLimitPolicy::per_seconds(100, 60);

    // database profile: five consecutive failures
    for _ in 0..5 {
        assert_eq!(
            limiter.check_action("user_1", "vote", &policy).await,
            Ok(RateLimitDecision::FailedOpen)
        );
    }
    let breaker = registry.get(STORE_BREAKER_NAME).unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(store.incr_calls(), 5);

    assert_eq!(
        limiter.check_action("user_1", "vote", &policy).await,
        Ok(RateLimitDecision::FailedOpen)
    );
    assert_eq!(store.incr_calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn each_request_counts_once_while_expiry_fails() {
    let store = Arc::new(ExpiryOutageStore::default());
    store.expiry_down.store(true, Ordering::SeqCst);
    let limiter = RateLimiter::builder_shared(store.clone()).build();
    let policy = RateLimitPolicy::per_seconds(2, 10);
    let key = rate_limit_key("user_3", "vote");

    for expected in 1..=3u64 {
        assert_eq!(
            limiter.check_action("user_3", "vote", &policy).await,
            Ok(RateLimitDecision::FailedOpen)
        );
        assert_eq!(store.counters.get(&key), Some(expected));
    }
    assert_eq!(store.incr_calls(), 3);
    assert_eq!(store.counters.ttl(&key), None);
}

#[tokio::test(start_paused = true)]
async fn window_closes_once_expiry_recovers() {
    let store = Arc::new(ExpiryOutageStore::default());
    store.expiry_down.store(true, Ordering::SeqCst);
    let limiter = RateLimiter::builder_shared(store.clone()).build();
    let policy = RateLimitPolicy::per_seconds(1, 10);
    let key = rate_limit_key("user_3", "vote");

    for _ in 0..2 {
        assert_eq!(
            limiter.check_action("user_3", "vote", &policy).await,
            Ok(RateLimitDecision::FailedOpen)
        );
    }

    store.expiry_down.store(false, Ordering::SeqCst);
    let rejected = limiter
        .check_action("user_3", "vote", &policy)
        .await
        .unwrap_err();
    assert_eq!(rejected.current_count, 3);
    assert_eq!(store.counters.ttl(&key), Some(Duration::from_secs(10)));

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(
        limiter.check_action("user_3", "vote", &policy).await,
        Ok(RateLimitDecision::Permitted {
            current_count: 1,
            remaining: 0,
        })
    );
}
