//! CLI for the resil retry runner.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use resil_core::config;
use resil_core::FailureKind;

use commands::{run_command, run_completions, run_config, run_man, run_schedule, RunOptions};

/// Top-level CLI for resil.
#[derive(Debug, Parser)]
#[command(name = "resil")]
#[command(
    about = "resil: run commands under a retry policy with exponential backoff",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a command, retrying it when it fails.
    Run {
        /// Named profile from config.toml (default: the [retry] section).
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Override the total number of attempts, including the first.
        #[arg(long, value_name = "N")]
        attempts: Option<u32>,
        /// Retry only these failure kinds (comma-separated, e.g. tool,api_timeout).
        /// Without this flag a failing exit status is always retryable.
        #[arg(long, value_delimiter = ',', value_name = "KIND")]
        retry_on: Vec<FailureKind>,
        /// Exit codes that mean "do not try again" (comma-separated).
        #[arg(long, value_delimiter = ',', value_name = "CODE")]
        fatal_exit_code: Vec<i32>,
        /// Give up after this many seconds in total, waits included.
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,
        /// Command and arguments, after `--`.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
        command: Vec<String>,
    },

    /// Print the backoff delays a policy would use (without jitter).
    Schedule {
        /// Named profile from config.toml.
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Override the total number of attempts.
        #[arg(long, value_name = "N")]
        attempts: Option<u32>,
    },

    /// Show the config file location and every resolved profile.
    Config,

    /// Generate shell completions on stdout.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Render the man page on stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run {
                profile,
                attempts,
                retry_on,
                fatal_exit_code,
                timeout,
                command,
            } => {
                let cfg = load_config()?;
                let opts = RunOptions {
                    profile: profile.as_deref(),
                    attempts,
                    retry_on: &retry_on,
                    fatal_exit_codes: &fatal_exit_code,
                    timeout_secs: timeout,
                };
                run_command(&cfg, &opts, &command).await?;
            }
            CliCommand::Schedule { profile, attempts } => {
                let cfg = load_config()?;
                run_schedule(&cfg, profile.as_deref(), attempts)?;
            }
            CliCommand::Config => run_config(&load_config()?)?,
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Man => run_man()?,
        }

        Ok(())
    }
}

fn load_config() -> Result<config::ResilConfig> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests;
