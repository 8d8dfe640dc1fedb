//! Observability hook: one event per retry transition.
//!
//! The executor only produces structured [`RetryEvent`]s; formatting and
//! routing belong to the observer. [`TracingObserver`] forwards them to
//! `tracing`, which is what callers get unless they plug in their own.

use std::time::Duration;

use crate::error::FailureKind;

/// Transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AttemptStarted,
    /// Attempt failed with a retryable kind; `delay` is set.
    DelayScheduled,
    Succeeded,
    /// Non-retryable failure, propagated unchanged.
    Terminal,
    Exhausted,
    Cancelled,
    /// Scope body left without `exit`; the attempt's outcome is unknown.
    Abandoned,
}

/// Structured payload handed to a [`RetryObserver`].
#[derive(Debug, Clone)]
pub struct RetryEvent<'a> {
    pub operation: &'a str,
    pub phase: Phase,
    pub attempt: u32,
    pub delay: Option<Duration>,
    pub kind: Option<FailureKind>,
    pub message: Option<String>,
}

/// Receives retry transitions. Must be cheap; it runs inline with the retry loop.
pub trait RetryObserver: Send + Sync {
    fn on_event(&self, event: &RetryEvent<'_>);
}

/// Emits each event through `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_event(&self, e: &RetryEvent<'_>) {
        let kind = e.kind.map(FailureKind::as_str).unwrap_or("-");
        let message = e.message.as_deref().unwrap_or("");
        match e.phase {
            Phase::AttemptStarted => {
                tracing::debug!(operation = e.operation, attempt = e.attempt, "attempt started");
            }
            Phase::Succeeded => {
                tracing::debug!(operation = e.operation, attempt = e.attempt, "attempt succeeded");
            }
            Phase::DelayScheduled => {
                let delay_ms = e.delay.map(|d| d.as_millis() as u64).unwrap_or(0);
                tracing::warn!(
                    operation = e.operation,
                    attempt = e.attempt,
                    delay_ms,
                    kind,
                    "attempt failed, retrying: {}",
                    message
                );
            }
            Phase::Terminal => {
                tracing::error!(
                    operation = e.operation,
                    attempt = e.attempt,
                    kind,
                    "non-retryable failure: {}",
                    message
                );
            }
            Phase::Exhausted => {
                tracing::error!(
                    operation = e.operation,
                    attempt = e.attempt,
                    kind,
                    "retries exhausted: {}",
                    message
                );
            }
            Phase::Cancelled => {
                tracing::info!(operation = e.operation, attempt = e.attempt, "retry cancelled");
            }
            Phase::Abandoned => {
                tracing::warn!(
                    operation = e.operation,
                    attempt = e.attempt,
                    "retry scope left without an outcome"
                );
            }
        }
    }
}

/// Adapts a closure into an observer, e.g. to count retries or trigger alerts.
pub struct FnObserver<F>(pub F);

impl<F> RetryObserver for FnObserver<F>
where
    F: Fn(&RetryEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RetryEvent<'_>) {
        (self.0)(event)
    }
}
