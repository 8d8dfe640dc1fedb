//! Wrapper adapter: turn an operation into a self-retrying one.
//!
//! The wrapped operation keeps its input type; only the error type changes to
//! [`RetryError`]. Arguments are cloned for every attempt, so multi-argument
//! operations take a tuple.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::Classify;

use super::error::RetryError;
use super::observe::{RetryObserver, TracingObserver};
use super::policy::RetryPolicy;
use super::run::RetryExecutor;

/// An operation bundled with the policy it retries under.
pub struct Retrying<F> {
    op: F,
    policy: RetryPolicy,
    name: String,
    observer: Arc<dyn RetryObserver>,
    cancel: Option<CancelToken>,
}

/// Wrap `op` so every call retries according to `policy`.
pub fn retrying<F>(policy: RetryPolicy, op: F) -> Retrying<F> {
    Retrying {
        op,
        policy,
        name: "operation".to_string(),
        observer: Arc::new(TracingObserver),
        cancel: None,
    }
}

impl<F> Retrying<F> {
    /// Name reported in observer events (default `"operation"`).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn executor(&self) -> RetryExecutor<'_> {
        let exec = RetryExecutor::new(&self.policy)
            .named(&self.name)
            .observer(&*self.observer);
        match &self.cancel {
            Some(token) => exec.cancel_on(token),
            None => exec,
        }
    }

    /// Blocking call.
    pub fn call<A, T, E>(&self, args: A) -> Result<T, RetryError<E>>
    where
        F: Fn(A) -> Result<T, E>,
        A: Clone,
        E: Classify + fmt::Display,
    {
        self.executor().run(|| (self.op)(args.clone()))
    }

    /// Cooperative call for operations returning a future.
    pub async fn call_async<A, T, E, Fut>(&self, args: A) -> Result<T, RetryError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        A: Clone,
        E: Classify + fmt::Display,
    {
        self.executor().run_async(|| (self.op)(args.clone())).await
    }

    /// Plain closure with the operation's input type.
    pub fn into_fn<A, T, E>(self) -> impl Fn(A) -> Result<T, RetryError<E>>
    where
        F: Fn(A) -> Result<T, E>,
        A: Clone,
        E: Classify + fmt::Display,
    {
        move |args| self.call(args)
    }
}

impl<F> fmt::Debug for Retrying<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrying")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
