//! Invariants:
//! - attempts never exceed `max_attempts`
//! - success on attempt `k` stops the loop at `k`
//! - the delay before attempt `k` is `backoff * 2^(k-2)`, capped

use bulwark_retry::{with_service_retry, ResourceKind, RetryOptions};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn attempts_never_exceed_max(
        max_attempts in 1usize..=8,
        succeed_on in proptest::option::of(1usize..=10),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let calls = AtomicUsize::new(0);

            let result = with_service_retry(
                || async {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    match succeed_on {
                        Some(k) if attempt >= k => Ok(attempt),
                        _ => Err("connection reset"),
                    }
                },
                ResourceKind::ExternalService,
                RetryOptions::new()
                    .max_attempts(max_attempts)
                    .backoff(Duration::from_millis(5)),
            )
            .await;

            let made = calls.load(Ordering::SeqCst);
            prop_assert!(made <= max_attempts);
            match succeed_on {
                Some(k) if k <= max_attempts => {
                    let outcome = result.unwrap();
                    prop_assert_eq!(outcome.attempts, k);
                    prop_assert_eq!(made, k);
                }
                _ => {
                    let err = result.unwrap_err();
                    prop_assert!(err.is_exhausted());
                    prop_assert_eq!(made, max_attempts);
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn backoff_doubles_up_to_the_cap(
        max_attempts in 2usize..=8,
        backoff_ms in 1u64..=500,
        cap_factor in 1u64..=16,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let backoff = Duration::from_millis(backoff_ms);
            let cap = backoff * cap_factor as u32;

            let err = with_service_retry(
                || async { Err::<(), _>("network unreachable") },
                ResourceKind::ExternalService,
                RetryOptions::new()
                    .max_attempts(max_attempts)
                    .backoff(backoff)
                    .max_backoff(cap),
            )
            .await
            .unwrap_err();

            let expected: Duration = (2..=max_attempts)
                .map(|k| (backoff * 2u32.pow(k as u32 - 2)).min(cap))
                .sum();
            match err {
                bulwark_retry::RetryError::Exhausted { elapsed, attempts, .. } => {
                    prop_assert_eq!(attempts, max_attempts);
                    // the timer wheel ticks in whole milliseconds
                    let drift = if elapsed > expected {
                        elapsed - expected
                    } else {
                        expected - elapsed
                    };
                    prop_assert!(drift <= Duration::from_millis(max_attempts as u64));
                }
                other => prop_assert!(false, "unexpected error: {}", other),
            }
            Ok(())
        })?;
    }
}
