//! Backoff delay computation.
//!
//! `initial_delay * multiplier^(attempt-1)`, capped at `max_delay`. With jitter
//! enabled the result is drawn uniformly from `[0, capped]` ("full jitter"), so
//! it never exceeds the un-jittered schedule.

use rand::Rng;
use std::time::Duration;

use super::policy::RetryPolicy;

/// Delay to wait after failed attempt `attempt` (1-based), before the next one.
///
/// # Panics
///
/// Panics if `attempt` is 0.
pub fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    compute_delay_with(attempt, policy, &mut rand::thread_rng())
}

/// Same as [`compute_delay`] with a caller-supplied random source.
pub fn compute_delay_with<R: Rng + ?Sized>(attempt: u32, policy: &RetryPolicy, rng: &mut R) -> Duration {
    let capped = capped_delay(attempt, policy);
    if !policy.jitter_enabled() || capped.is_zero() {
        return capped;
    }
    let secs = rng.gen_range(0.0..=capped.as_secs_f64());
    Duration::from_secs_f64(secs).min(capped)
}

/// Un-jittered delay for `attempt`: exponential growth clipped to `max_delay`.
pub fn capped_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    assert!(attempt >= 1, "attempt numbers start at 1, got {attempt}");
    let max = policy.max_delay();
    if policy.initial_delay().is_zero() {
        return Duration::ZERO;
    }
    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let raw = policy.initial_delay().as_secs_f64() * policy.backoff_multiplier().powi(exponent);
    if !raw.is_finite() || raw >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(raw).min(max)
}

/// Un-jittered delays before attempts 2..=max_attempts.
pub fn schedule(policy: &RetryPolicy) -> Vec<Duration> {
    (1..policy.max_attempts())
        .map(|attempt| capped_delay(attempt, policy))
        .collect()
}
