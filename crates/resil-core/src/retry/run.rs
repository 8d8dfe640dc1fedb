//! Retry loop: run an operation until success, a terminal failure, exhaustion,
//! or cancellation.
//!
//! [`RetryExecutor::run`] blocks the calling thread during backoff waits;
//! [`RetryExecutor::run_async`] suspends the task instead, leaving the runtime
//! free to drive other work. Both walk the same transitions.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::Classify;

use super::error::RetryError;
use super::observe::{RetryObserver, TracingObserver};
use super::policy::RetryPolicy;
use super::state::{Invocation, Step};

/// Runs operations under a [`RetryPolicy`].
///
/// Cheap to build per call; it only borrows the policy, observer and token.
#[derive(Clone, Copy)]
pub struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
    operation: &'a str,
    observer: &'a dyn RetryObserver,
    cancel: Option<&'a CancelToken>,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            operation: "operation",
            observer: &TracingObserver,
            cancel: None,
        }
    }

    /// Name reported in every observer event.
    pub fn named(mut self, operation: &'a str) -> Self {
        self.operation = operation;
        self
    }

    pub fn observer(mut self, observer: &'a dyn RetryObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn cancel_on(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &'a RetryPolicy {
        self.policy
    }

    /// Blocking mode: the calling thread sleeps through each backoff delay.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        let mut inv = self.invocation();
        loop {
            if self.is_cancelled() {
                return Err(inv.cancelled(inv.attempt() - 1));
            }
            inv.begin();
            match op() {
                Ok(value) => {
                    inv.succeeded();
                    return Ok(value);
                }
                Err(e) => match inv.failed(e) {
                    Step::Stop(err) => return Err(err),
                    Step::Wait(delay) => {
                        if self.sleep(delay) {
                            return Err(inv.cancelled(inv.attempt()));
                        }
                        inv.advance(delay);
                    }
                },
            }
        }
    }

    /// Cooperative mode: waits yield to the tokio scheduler. A cancelled token
    /// also drops an attempt that is still running.
    pub async fn run_async<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut inv = self.invocation();
        loop {
            if self.is_cancelled() {
                return Err(inv.cancelled(inv.attempt() - 1));
            }
            inv.begin();
            let outcome = match self.cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return Err(inv.cancelled(inv.attempt())),
                        outcome = op() => outcome,
                    }
                }
                None => op().await,
            };
            match outcome {
                Ok(value) => {
                    inv.succeeded();
                    return Ok(value);
                }
                Err(e) => match inv.failed(e) {
                    Step::Stop(err) => return Err(err),
                    Step::Wait(delay) => {
                        if self.pause(delay).await {
                            return Err(inv.cancelled(inv.attempt()));
                        }
                        inv.advance(delay);
                    }
                },
            }
        }
    }

    pub(super) fn invocation<E>(&self) -> Invocation<'a, E>
    where
        E: Classify + fmt::Display,
    {
        Invocation::new(self.policy, self.observer, self.operation)
    }

    pub(super) fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Returns `true` if cancelled during the wait.
    pub(super) fn sleep(&self, delay: Duration) -> bool {
        match self.cancel {
            Some(token) => token.wait_timeout(delay),
            None => {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                false
            }
        }
    }

    /// Async counterpart of `sleep`.
    pub(super) async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            // Zero-delay retries still give other tasks a turn.
            tokio::task::yield_now().await;
            return self.is_cancelled();
        }
        match self.cancel {
            Some(token) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => false,
                    () = token.cancelled() => true,
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                false
            }
        }
    }
}

impl fmt::Debug for RetryExecutor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", self.policy)
            .field("operation", &self.operation)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
pub fn run_with_retry<T, E, F>(policy: &RetryPolicy, f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: Classify + fmt::Display,
{
    RetryExecutor::new(policy).run(f)
}

/// Async counterpart of [`run_with_retry`].
pub async fn run_with_retry_async<T, E, F, Fut>(policy: &RetryPolicy, f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    RetryExecutor::new(policy).run_async(f).await
}
