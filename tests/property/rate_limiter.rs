//! Invariants:
//! - exactly `requests` checks are permitted per window
//! - every later check in the window is rejected with the running count

use bulwark_ratelimiter::{InMemoryCounterStore, RateLimitPolicy, RateLimiter};
use proptest::prelude::*;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn permits_exactly_the_limit(
        requests in 1u64..=50,
        attempts in 1u64..=100,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let limiter = RateLimiter::builder(InMemoryCounterStore::new()).build();
            let policy = RateLimitPolicy::per_seconds(requests, 60);

            let mut permitted = 0u64;
            for n in 1..=attempts {
                match limiter.check_action("actor", "action", &policy).await {
                    Ok(_) => permitted += 1,
                    Err(rejection) => {
                        prop_assert_eq!(rejection.current_count, n);
                        prop_assert_eq!(rejection.limit, requests);
                    }
                }
            }

            prop_assert_eq!(permitted, attempts.min(requests));
            Ok(())
        })?;
    }
}
