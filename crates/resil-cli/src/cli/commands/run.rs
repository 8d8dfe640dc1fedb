//! `resil run -- <cmd> [args..]` – run a child process under the retry policy.

use anyhow::{anyhow, bail, Context, Result};
use resil_core::config::ResilConfig;
use resil_core::retry::RetryExecutor;
use resil_core::{CancelToken, Failure, FailureKind, KindSet, RetryPolicy};
use std::io;
use std::time::Duration;
use tokio::process::Command;

use super::resolve_policy;

/// Flags of `resil run`, borrowed from the parsed command line.
#[derive(Debug, Default)]
pub struct RunOptions<'a> {
    pub profile: Option<&'a str>,
    pub attempts: Option<u32>,
    pub retry_on: &'a [FailureKind],
    pub fatal_exit_codes: &'a [i32],
    pub timeout_secs: Option<f64>,
}

/// Profile policy plus the run-specific overrides. A failing exit status maps
/// to `Tool`, which is added to the retryable set unless `--retry-on` names
/// the kinds explicitly.
pub(crate) fn run_policy(cfg: &ResilConfig, opts: &RunOptions<'_>) -> Result<RetryPolicy> {
    let base = resolve_policy(cfg, opts.profile, opts.attempts)?;
    let builder = if opts.retry_on.is_empty() {
        base.to_builder().also_retry(FailureKind::Tool)
    } else {
        base.to_builder()
            .retry_on(opts.retry_on.iter().copied().collect::<KindSet>())
    };
    Ok(builder.build()?)
}

/// One attempt: spawn, wait, and classify the exit status.
pub(crate) async fn run_child(
    program: &str,
    args: &[String],
    fatal_exit_codes: &[i32],
) -> Result<(), Failure> {
    let status = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                Failure::wrap(FailureKind::ToolNotFound, format!("{program}: not found"), e)
            }
            _ => Failure::wrap(FailureKind::Tool, format!("spawn {program}"), e),
        })?;

    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) if fatal_exit_codes.contains(&code) => Err(Failure::validation(format!(
            "{program} exited with fatal code {code}"
        ))),
        Some(code) => Err(Failure::new(
            FailureKind::Tool,
            format!("{program} exited with code {code}"),
        )),
        None => Err(Failure::new(
            FailureKind::Tool,
            format!("{program} terminated by signal"),
        )),
    }
}

pub async fn run_command(cfg: &ResilConfig, opts: &RunOptions<'_>, command: &[String]) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("no command given");
    };
    let policy = run_policy(cfg, opts)?;
    let limit = opts
        .timeout_secs
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("--timeout must be a non-negative number of seconds, got {secs}"))
        })
        .transpose()?;

    let token = CancelToken::new();
    let interrupt = tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling retries");
                token.cancel();
            }
        }
    });

    let exec = RetryExecutor::new(&policy)
        .named(program)
        .cancel_on(&token);
    tracing::info!(
        "running {} under retry policy: {} attempt(s), initial {:?}, max {:?}",
        program,
        policy.max_attempts(),
        policy.initial_delay(),
        policy.max_delay()
    );
    let attempts = exec.run_async(|| run_child(program, args, opts.fatal_exit_codes));
    let outcome = match limit {
        Some(limit) => tokio::time::timeout(limit, attempts)
            .await
            .map_err(|_| anyhow!("{program} did not succeed within {limit:?}"))?,
        None => attempts.await,
    };
    interrupt.abort();

    outcome.with_context(|| format!("{program} failed"))?;
    tracing::info!("{} succeeded", program);
    Ok(())
}
