//! Back-off delay properties over many cycles.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tickloop_core::backoff::{base_delay_secs, delay, delay_with_rng};
use tickloop_core::RetryConfig;

fn retries(jitter: bool) -> RetryConfig {
    RetryConfig {
        base_seconds: 5.0,
        max_seconds: 60.0,
        jitter,
        max_cycles: None,
    }
}

#[test]
fn delay_without_jitter_matches_closed_form() {
    let cfg = retries(false);
    for cycle in 1..=64u64 {
        let expected = (5.0 * 2f64.powi((cycle - 1) as i32)).min(60.0);
        assert_eq!(delay(cycle, &cfg), Duration::from_secs_f64(expected), "cycle {cycle}");
    }
}

#[test]
fn delay_is_monotone_until_saturation() {
    let cfg = retries(false);
    let delays: Vec<Duration> = (1..=20).map(|c| delay(c, &cfg)).collect();
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*delays.last().unwrap(), Duration::from_secs(60));
}

#[test]
fn jittered_delay_stays_in_band() {
    let cfg = retries(true);
    let mut rng = StdRng::seed_from_u64(0x71c4);
    for cycle in 1..=10u64 {
        let base = base_delay_secs(cycle, &cfg);
        for _ in 0..200 {
            let secs = delay_with_rng(cycle, &cfg, &mut rng).as_secs_f64();
            assert!(secs >= (0.7 * base).max(1.0) - 1e-6, "cycle {cycle}: {secs}");
            assert!(secs <= 1.3 * base + 1e-6, "cycle {cycle}: {secs}");
        }
    }
}

#[test]
fn tiny_base_is_floored_at_one_second() {
    let cfg = RetryConfig {
        base_seconds: 0.1,
        max_seconds: 0.2,
        jitter: true,
        max_cycles: None,
    };
    let mut rng = StdRng::seed_from_u64(9);
    for cycle in 1..=5 {
        assert_eq!(delay_with_rng(cycle, &cfg, &mut rng), Duration::from_secs(1));
    }
}
