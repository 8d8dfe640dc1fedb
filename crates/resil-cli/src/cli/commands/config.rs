//! `resil config` – where the config lives and what it resolves to.

use anyhow::Result;
use resil_core::config::{self, ResilConfig, RetryConfig};

fn print_profile(name: &str, p: &RetryConfig) {
    let kinds: Vec<&str> = p.retry_on.iter().map(|k| k.as_str()).collect();
    println!(
        "{:<12} {:>8} {:>10} {:>10} {:>6} {:<6} {}",
        name,
        p.max_attempts,
        p.initial_delay_secs,
        p.max_delay_secs,
        p.backoff_multiplier,
        p.jitter,
        kinds.join(",")
    );
}

pub fn run_config(cfg: &ResilConfig) -> Result<()> {
    println!("Config file: {}", config::config_path()?.display());
    println!();
    println!(
        "{:<12} {:>8} {:>10} {:>10} {:>6} {:<6} {}",
        "PROFILE", "ATTEMPTS", "INITIAL(s)", "MAX(s)", "MULT", "JITTER", "RETRY_ON"
    );
    print_profile("default", &cfg.retry);
    for (name, profile) in &cfg.profiles {
        print_profile(name, profile);
        // Surface bad profiles here instead of on the next `run`.
        if let Err(e) = profile.to_policy() {
            println!("  warning: {:#}", e);
        }
    }
    Ok(())
}
