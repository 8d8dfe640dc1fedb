//! `resil schedule` – the un-jittered backoff table for a profile.

use anyhow::Result;
use resil_core::config::ResilConfig;
use resil_core::retry::schedule;
use std::time::Duration;

use super::resolve_policy;

/// `(attempt, wait before it, total waited so far)` for attempts 2..=max.
pub(crate) fn schedule_rows(delays: &[Duration]) -> Vec<(u32, Duration, Duration)> {
    let mut total = Duration::ZERO;
    delays
        .iter()
        .zip(2u32..)
        .map(|(&d, attempt)| {
            total += d;
            (attempt, d, total)
        })
        .collect()
}

pub fn run_schedule(cfg: &ResilConfig, profile: Option<&str>, attempts: Option<u32>) -> Result<()> {
    let policy = resolve_policy(cfg, profile, attempts)?;
    let delays = schedule(&policy);
    println!(
        "Profile {}: {} attempt(s), jitter {}",
        profile.unwrap_or("default"),
        policy.max_attempts(),
        if policy.jitter_enabled() { "on (delays below are upper bounds)" } else { "off" }
    );
    if delays.is_empty() {
        println!("No retries: the first failure is final.");
        return Ok(());
    }
    println!("  {:>7}  {:>10}  {:>10}", "Attempt", "Wait(s)", "Total(s)");
    println!("  {}  {}  {}", "-------", "----------", "----------");
    for (attempt, wait, total) in schedule_rows(&delays) {
        println!(
            "  {:>7}  {:>10.3}  {:>10.3}",
            attempt,
            wait.as_secs_f64(),
            total.as_secs_f64()
        );
    }
    Ok(())
}
