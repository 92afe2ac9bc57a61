//! Back-off between failed cycles.
//!
//! `delay = min(max_seconds, base_seconds * 2^(cycle-1))`, optionally scaled
//! by a uniform factor in `[0.7, 1.3]`, never less than one second.
//!
//! The computation is pure: callers supply the jitter source, and nothing
//! here sleeps.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Lower bound of the jitter factor.
pub const JITTER_MIN: f64 = 0.7;
/// Upper bound of the jitter factor.
pub const JITTER_MAX: f64 = 1.3;
/// No delay is ever shorter than this.
pub const MIN_DELAY_SECS: f64 = 1.0;

/// Un-jittered delay in seconds for `cycle` (1-based).
///
/// Cycle 0 is treated as cycle 1. Large cycles saturate at `max_seconds`.
pub fn base_delay_secs(cycle: u64, config: &RetryConfig) -> f64 {
    let exponent = i32::try_from(cycle.saturating_sub(1)).unwrap_or(i32::MAX);
    let grown = config.base_seconds * 2f64.powi(exponent);
    grown.min(config.max_seconds)
}

/// Scale `base_secs` by `factor` and apply the one-second floor.
///
/// Values beyond what a `Duration` can hold saturate at `Duration::MAX`.
pub fn scaled(base_secs: f64, factor: f64) -> Duration {
    Duration::try_from_secs_f64((base_secs * factor).max(MIN_DELAY_SECS)).unwrap_or(Duration::MAX)
}

/// Delay before the cycle after `cycle`, drawing jitter from `rng`.
pub fn delay_with_rng<R: Rng + ?Sized>(cycle: u64, config: &RetryConfig, rng: &mut R) -> Duration {
    let factor = if config.jitter {
        rng.gen_range(JITTER_MIN..=JITTER_MAX)
    } else {
        1.0
    };
    scaled(base_delay_secs(cycle, config), factor)
}

/// Delay before the cycle after `cycle`, using the thread-local RNG for jitter.
pub fn delay(cycle: u64, config: &RetryConfig) -> Duration {
    delay_with_rng(cycle, config, &mut rand::thread_rng())
}
