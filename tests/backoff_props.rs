//! Property tests for the backoff calculator.

use hermod::providers::{backoff, capped_backoff};
use hermod::{ErrorClass, RetryPolicy, classify};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

proptest! {
    #[test]
    fn capped_backoff_is_non_decreasing(
        attempt in 1u32..200,
        rate_limited: bool,
        base in 0.0f64..10.0,
        extra in 0.0f64..500.0,
        multiplier in 1.0f64..10.0,
    ) {
        let max = base + extra;
        let a = capped_backoff(attempt, rate_limited, base, max, multiplier);
        let b = capped_backoff(attempt + 1, rate_limited, base, max, multiplier);
        prop_assert!(a <= b);
        prop_assert!(b <= max);
    }

    #[test]
    fn backoff_never_exceeds_max(
        attempt in 0u32..=u32::MAX,
        rate_limited: bool,
        base in 0.0f64..10.0,
        extra in 0.0f64..500.0,
        multiplier in 1.0f64..10.0,
        jitter in 0.0f64..5.0,
    ) {
        let max = base + extra;
        let wait = backoff(attempt, rate_limited, base, max, multiplier, jitter);
        prop_assert!(wait >= 0.0);
        prop_assert!(wait <= max);
    }

    #[test]
    fn rate_limited_waits_at_least_as_long(
        attempt in 1u32..40,
        base in 0.0f64..10.0,
        extra in 0.0f64..500.0,
        multiplier in 1.0f64..10.0,
    ) {
        let max = base + extra;
        let plain = capped_backoff(attempt, false, base, max, multiplier);
        let throttled = capped_backoff(attempt, true, base, max, multiplier);
        prop_assert!(throttled >= plain);
    }

    #[test]
    fn policy_delay_respects_cap(attempt in 1u32..64, seed: u64, jitter in 0.0f64..10.0) {
        let policy = RetryPolicy::new().jitter_max(jitter);
        let mut rng = StdRng::seed_from_u64(seed);
        let delay = policy.delay_for_attempt(attempt, ErrorClass::RateLimited, &mut rng);
        prop_assert!(delay.sleep <= policy.max_backoff);
        prop_assert!(delay.jitter <= jitter);
    }

    #[test]
    fn classify_is_case_insensitive(prefix in "[a-z ]{0,8}", suffix in "[a-z ]{0,8}") {
        let text = format!("{prefix}RESOURCE_EXHAUSTED{suffix}");
        prop_assert_eq!(classify(&text), ErrorClass::RateLimited);
        prop_assert_eq!(classify(&text.to_lowercase()), ErrorClass::RateLimited);
    }
}
