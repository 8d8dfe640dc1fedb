//! Scoped-block adapter for code that is not a single callable.
//!
//! ```no_run
//! # use resil_core::retry::{RetryPolicy, RetryScope};
//! # use resil_core::error::Failure;
//! # fn connect() -> Result<(), Failure> { Ok(()) }
//! # fn upload() -> Result<(), Failure> { Ok(()) }
//! let policy = RetryPolicy::default();
//! let mut scope = RetryScope::new(&policy);
//! while let Some(attempt) = scope.enter() {
//!     let outcome = connect().and_then(|_| upload());
//!     attempt.exit(outcome);
//! }
//! scope.finish()?;
//! # Ok::<(), resil_core::retry::RetryError<Failure>>(())
//! ```
//!
//! The body may run more than once, and every pass must end in `exit` or
//! `exit_async`. Dropping an [`Attempt`] without either (an early `?` return
//! or a panic unwinding through the body) abandons the scope: nothing is
//! recorded as a success and `finish` reports [`RetryError::Abandoned`].

use std::fmt;
use std::time::Duration;

use crate::error::Classify;

use super::error::RetryError;
use super::policy::RetryPolicy;
use super::run::RetryExecutor;
use super::state::{Invocation, RetryState, Step};

pub struct RetryScope<'a, E>
where
    E: Classify + fmt::Display,
{
    exec: RetryExecutor<'a>,
    inv: Invocation<'a, E>,
    outcome: Option<Result<(), RetryError<E>>>,
}

impl<'a, E> RetryScope<'a, E>
where
    E: Classify + fmt::Display,
{
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self::with_executor(RetryExecutor::new(policy))
    }

    /// Use an executor's name, observer and cancel token.
    pub fn with_executor(exec: RetryExecutor<'a>) -> Self {
        Self {
            inv: exec.invocation(),
            exec,
            outcome: None,
        }
    }

    /// Attempt number the next `enter` starts (or the current one, inside a body).
    pub fn attempt(&self) -> u32 {
        self.inv.attempt()
    }

    /// Attempt count, wait time and last failure so far.
    pub fn state(&self) -> &RetryState<E> {
        self.inv.state()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Begin an attempt. `None` once the scope has succeeded, failed for good,
    /// or been cancelled.
    pub fn enter(&mut self) -> Option<Attempt<'_, 'a, E>> {
        if self.outcome.is_some() {
            return None;
        }
        if self.exec.is_cancelled() {
            self.outcome = Some(Err(self.inv.cancelled(self.inv.attempt() - 1)));
            return None;
        }
        self.inv.begin();
        Some(Attempt {
            scope: self,
            exited: false,
        })
    }

    /// Final result: `Ok` after a successful exit, otherwise the terminal,
    /// exhausted, cancelled or abandoned error.
    pub fn finish(self) -> Result<(), RetryError<E>> {
        self.outcome.unwrap_or(Ok(()))
    }

    /// Returns the delay to wait before re-entering, if any.
    fn record(&mut self, outcome: Result<(), E>) -> Option<Duration> {
        match outcome {
            Ok(()) => {
                self.inv.succeeded();
                self.outcome = Some(Ok(()));
                None
            }
            Err(e) => match self.inv.failed(e) {
                Step::Stop(err) => {
                    self.outcome = Some(Err(err));
                    None
                }
                Step::Wait(delay) => Some(delay),
            },
        }
    }

    fn waited(&mut self, delay: Duration, cancelled: bool) {
        if cancelled {
            self.outcome = Some(Err(self.inv.cancelled(self.inv.attempt())));
        } else {
            self.inv.advance(delay);
        }
    }
}

/// Handle for one pass through the scope body.
pub struct Attempt<'s, 'a, E>
where
    E: Classify + fmt::Display,
{
    scope: &'s mut RetryScope<'a, E>,
    exited: bool,
}

impl<'s, 'a, E> Attempt<'s, 'a, E>
where
    E: Classify + fmt::Display,
{
    pub fn number(&self) -> u32 {
        self.scope.inv.attempt()
    }

    /// Leave the body. A retryable failure blocks the thread for the backoff
    /// delay before the next `enter`.
    pub fn exit(mut self, outcome: Result<(), E>) {
        self.exited = true;
        if let Some(delay) = self.scope.record(outcome) {
            let cancelled = self.scope.exec.sleep(delay);
            self.scope.waited(delay, cancelled);
        }
    }

    /// Like [`exit`](Self::exit) but the backoff wait yields to the runtime.
    pub async fn exit_async(mut self, outcome: Result<(), E>) {
        self.exited = true;
        if let Some(delay) = self.scope.record(outcome) {
            let cancelled = self.scope.exec.pause(delay).await;
            self.scope.waited(delay, cancelled);
        }
    }
}

impl<E> Drop for Attempt<'_, '_, E>
where
    E: Classify + fmt::Display,
{
    fn drop(&mut self) {
        if !self.exited {
            if std::thread::panicking() {
                tracing::debug!(attempt = self.number(), "retry scope unwinding");
            }
            let abandoned = self.scope.inv.abandoned();
            self.scope.outcome = Some(Err(abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::error::Failure;
    use crate::retry::observe::{FnObserver, Phase, RetryEvent};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Mutex;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .jitter(false)
            .build()
            .unwrap()
    }

    #[test]
    fn body_reruns_until_success() {
        let policy = quick(5);
        let mut scope = RetryScope::new(&policy);
        let mut runs = 0;
        let mut log = Vec::new();
        while let Some(attempt) = scope.enter() {
            runs += 1;
            log.push(attempt.number());
            let outcome = if runs < 3 {
                Err(Failure::fetch("flaky"))
            } else {
                Ok(())
            };
            attempt.exit(outcome);
        }
        assert!(scope.is_finished());
        scope.finish().unwrap();
        assert_eq!(runs, 3);
        assert_eq!(log, vec![1, 2, 3]);
    }

    #[test]
    fn exhaustion_surfaces_from_finish() {
        let policy = quick(2);
        let mut scope = RetryScope::new(&policy);
        let mut runs = 0;
        while let Some(attempt) = scope.enter() {
            runs += 1;
            attempt.exit(Err(Failure::api("503")));
        }
        assert_eq!(runs, 2);
        assert_eq!(scope.state().elapsed(), Duration::from_millis(1));
        let err = scope.finish().unwrap_err();
        assert_eq!(err.as_exhausted().unwrap().attempts_made(), 2);
    }

    #[test]
    fn dropping_attempt_abandons_the_scope() {
        let policy = quick(3);
        let phases = Mutex::new(Vec::new());
        let observer = FnObserver(|e: &RetryEvent<'_>| phases.lock().unwrap().push(e.phase));
        let mut scope: RetryScope<'_, Failure> =
            RetryScope::with_executor(RetryExecutor::new(&policy).observer(&observer));
        let mut runs = 0;
        while let Some(_attempt) = scope.enter() {
            runs += 1;
        }
        assert_eq!(runs, 1);
        assert!(matches!(
            scope.finish(),
            Err(RetryError::Abandoned { attempt: 1 })
        ));
        assert_eq!(
            *phases.lock().unwrap(),
            vec![Phase::AttemptStarted, Phase::Abandoned]
        );
    }

    fn read_orders() -> Result<Vec<u32>, Failure> {
        Err(Failure::fetch("socket dropped"))
    }

    fn sync_orders(scope: &mut RetryScope<'_, Failure>, runs: &mut u32) -> Result<(), Failure> {
        while let Some(attempt) = scope.enter() {
            *runs += 1;
            let orders = read_orders()?;
            attempt.exit(if orders.is_empty() {
                Err(Failure::fetch("no orders yet"))
            } else {
                Ok(())
            });
        }
        Ok(())
    }

    #[test]
    fn early_return_from_body_is_not_a_success() {
        let policy = quick(3);
        let phases = Mutex::new(Vec::new());
        let observer = FnObserver(|e: &RetryEvent<'_>| phases.lock().unwrap().push(e.phase));
        let mut scope = RetryScope::with_executor(RetryExecutor::new(&policy).observer(&observer));
        let mut runs = 0;

        let err = sync_orders(&mut scope, &mut runs).unwrap_err();
        assert_eq!(err.message(), "socket dropped");
        assert_eq!(runs, 1);
        assert!(scope.enter().is_none());
        assert!(matches!(
            scope.finish(),
            Err(RetryError::Abandoned { attempt: 1 })
        ));
        let phases = phases.lock().unwrap();
        assert!(!phases.contains(&Phase::Succeeded));
        assert_eq!(phases.last(), Some(&Phase::Abandoned));
    }

    #[test]
    fn panic_in_body_is_not_a_success() {
        let policy = quick(3);
        let phases = Mutex::new(Vec::new());
        let observer = FnObserver(|e: &RetryEvent<'_>| phases.lock().unwrap().push(e.phase));
        let mut scope: RetryScope<'_, Failure> =
            RetryScope::with_executor(RetryExecutor::new(&policy).observer(&observer));

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
            while let Some(_attempt) = scope.enter() {
                panic!("order book corrupted");
            }
        }));
        assert!(unwound.is_err());
        assert!(scope.is_finished());
        assert!(matches!(
            scope.finish(),
            Err(RetryError::Abandoned { attempt: 1 })
        ));
        assert_eq!(
            *phases.lock().unwrap(),
            vec![Phase::AttemptStarted, Phase::Abandoned]
        );
    }

    #[test]
    fn terminal_failure_stops_immediately() {
        let policy = quick(5);
        let mut scope = RetryScope::new(&policy);
        let mut runs = 0;
        while let Some(attempt) = scope.enter() {
            runs += 1;
            attempt.exit(Err(Failure::signal_parse("no BUY/SELL tag")));
        }
        assert_eq!(runs, 1);
        assert!(matches!(scope.finish(), Err(RetryError::Terminal(_))));
    }

    #[test]
    fn cancelled_token_prevents_entry() {
        let policy = quick(5);
        let token = CancelToken::new();
        token.cancel();
        let mut scope: RetryScope<'_, Failure> =
            RetryScope::with_executor(RetryExecutor::new(&policy).cancel_on(&token));
        assert!(scope.enter().is_none());
        assert!(matches!(
            scope.finish(),
            Err(RetryError::Cancelled { attempts: 0 })
        ));
    }

    #[tokio::test]
    async fn async_exit_retries_without_blocking() {
        let policy = quick(3);
        let mut scope = RetryScope::new(&policy);
        let mut runs = 0;
        while let Some(attempt) = scope.enter() {
            runs += 1;
            let outcome = if runs == 1 {
                Err(Failure::fetch("first"))
            } else {
                Ok(())
            };
            attempt.exit_async(outcome).await;
        }
        assert_eq!(runs, 2);
        assert!(scope.finish().is_ok());
    }

    #[test]
    fn cancel_during_blocking_exit_wait_stops_the_scope() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .initial_delay(Duration::from_secs(30))
            .max_delay(Duration::from_secs(30))
            .jitter(false)
            .build()
            .unwrap();
        let token = CancelToken::new();
        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                token.cancel();
            })
        };
        let mut scope = RetryScope::with_executor(RetryExecutor::new(&policy).cancel_on(&token));
        let mut runs = 0;
        while let Some(attempt) = scope.enter() {
            runs += 1;
            attempt.exit(Err(Failure::fetch("feed stalled")));
        }
        canceller.join().unwrap();
        assert_eq!(runs, 1);
        assert!(matches!(
            scope.finish(),
            Err(RetryError::Cancelled { attempts: 1 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_async_exit_wait_stops_the_scope() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .initial_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(10))
            .jitter(false)
            .build()
            .unwrap();
        let token = CancelToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                token.cancel();
            })
        };
        let start = tokio::time::Instant::now();
        let mut scope = RetryScope::with_executor(RetryExecutor::new(&policy).cancel_on(&token));
        let mut runs = 0;
        while let Some(attempt) = scope.enter() {
            runs += 1;
            attempt.exit_async(Err(Failure::fetch("feed stalled"))).await;
        }
        canceller.await.unwrap();
        assert_eq!(runs, 1);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(matches!(
            scope.finish(),
            Err(RetryError::Cancelled { attempts: 1 })
        ));
    }
}
