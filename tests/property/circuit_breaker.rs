//! Invariants:
//! - `threshold` consecutive failures open the breaker
//! - fewer consecutive failures leave it closed
//! - an open breaker never invokes the operation

use bulwark_circuitbreaker::{CircuitBreaker, CircuitState};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn threshold_failures_open_the_breaker(
        threshold in 1u32..=10,
        extra_calls in 0usize..=10,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreaker::builder("property")
                .failure_threshold(threshold)
                .reset_timeout(Duration::from_secs(60))
                .build();
            let calls = AtomicUsize::new(0);

            for _ in 0..(threshold as usize + extra_calls) {
                let _ = breaker
                    .call(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>("unavailable")
                    })
                    .await;
            }

            prop_assert_eq!(breaker.state(), CircuitState::Open);
            prop_assert_eq!(calls.load(Ordering::SeqCst), threshold as usize);
            prop_assert_eq!(breaker.metrics().rejected_calls, extra_calls as u64);
            Ok(())
        })?;
    }

    #[test]
    fn interrupted_failure_runs_stay_closed(
        threshold in 2u32..=10,
        runs in proptest::collection::vec(0u32..10, 1..20),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreaker::builder("property")
                .failure_threshold(threshold)
                .build();

            for run in runs {
                for _ in 0..run.min(threshold - 1) {
                    let _ = breaker.call(|| async { Err::<(), _>("unavailable") }).await;
                }
                let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;
                prop_assert_eq!(breaker.state(), CircuitState::Closed);
                prop_assert_eq!(breaker.metrics().failure_count, 0);
            }
            Ok(())
        })?;
    }
}
