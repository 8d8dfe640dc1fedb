//! CLI command handlers, one file per subcommand.

mod completions;
mod config;
mod man;
mod run;
mod schedule;

pub use completions::run_completions;
pub use config::run_config;
pub use man::run_man;
pub use run::{run_command, RunOptions};
pub use schedule::run_schedule;

use anyhow::Result;
use resil_core::config::ResilConfig;
use resil_core::RetryPolicy;

/// Policy for `profile` with an optional `--attempts` override applied.
pub(crate) fn resolve_policy(
    cfg: &ResilConfig,
    profile: Option<&str>,
    attempts: Option<u32>,
) -> Result<RetryPolicy> {
    let policy = cfg.policy(profile)?;
    match attempts {
        Some(n) => Ok(policy.to_builder().max_attempts(n).build()?),
        None => Ok(policy),
    }
}
