//! Per-invocation retry bookkeeping.
//!
//! One [`RetryState`] lives for exactly one in-flight invocation and is never
//! shared; [`Invocation`] pairs it with the policy and observer so the blocking
//! loop, the async loop and the scope adapter all walk the same transitions.

use std::fmt;
use std::time::Duration;

use crate::error::{Classify, FailureKind};

use super::error::{RetryError, RetryExhausted};
use super::observe::{Phase, RetryEvent, RetryObserver};
use super::policy::{RetryDecision, RetryPolicy};

/// One failed attempt.
#[derive(Debug)]
pub struct FailureRecord<E> {
    pub attempt: u32,
    pub kind: FailureKind,
    pub error: E,
}

/// Mutable state of a single invocation.
#[derive(Debug)]
pub struct RetryState<E> {
    attempt: u32,
    elapsed: Duration,
    failures: Vec<FailureRecord<E>>,
}

impl<E> Default for RetryState<E> {
    fn default() -> Self {
        Self {
            attempt: 1,
            elapsed: Duration::ZERO,
            failures: Vec::new(),
        }
    }
}

impl<E> RetryState<E> {
    /// Current attempt number (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Cumulative time spent in backoff waits.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn last_failure(&self) -> Option<&FailureRecord<E>> {
        self.failures.last()
    }
}

/// What the loop does next after a failed attempt.
pub(crate) enum Step<E> {
    Wait(Duration),
    Stop(RetryError<E>),
}

pub(crate) struct Invocation<'a, E> {
    policy: &'a RetryPolicy,
    observer: &'a dyn RetryObserver,
    operation: &'a str,
    state: RetryState<E>,
}

impl<'a, E> Invocation<'a, E>
where
    E: Classify + fmt::Display,
{
    pub(crate) fn new(
        policy: &'a RetryPolicy,
        observer: &'a dyn RetryObserver,
        operation: &'a str,
    ) -> Self {
        Self {
            policy,
            observer,
            operation,
            state: RetryState::default(),
        }
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.state.attempt
    }

    pub(crate) fn state(&self) -> &RetryState<E> {
        &self.state
    }

    pub(crate) fn begin(&self) {
        self.emit(Phase::AttemptStarted, None, None, None);
    }

    pub(crate) fn succeeded(&self) {
        self.emit(Phase::Succeeded, None, None, None);
    }

    /// Classify `error` and decide between waiting and stopping.
    pub(crate) fn failed(&mut self, error: E) -> Step<E> {
        let attempt = self.state.attempt;
        let kind = error.kind();
        let message = error.to_string();
        match self.policy.decide(attempt, kind) {
            RetryDecision::Terminal => {
                self.emit(Phase::Terminal, None, Some(kind), Some(message));
                Step::Stop(RetryError::Terminal(error))
            }
            RetryDecision::Exhausted => {
                self.emit(Phase::Exhausted, None, Some(kind), Some(message));
                let earlier = std::mem::take(&mut self.state.failures);
                let last = FailureRecord {
                    attempt,
                    kind,
                    error,
                };
                Step::Stop(RetryError::Exhausted(RetryExhausted::new(
                    attempt,
                    self.state.elapsed,
                    earlier,
                    last,
                )))
            }
            RetryDecision::RetryAfter(delay) => {
                self.emit(Phase::DelayScheduled, Some(delay), Some(kind), Some(message));
                self.state.failures.push(FailureRecord {
                    attempt,
                    kind,
                    error,
                });
                Step::Wait(delay)
            }
        }
    }

    /// Record a completed wait and move on to the next attempt.
    pub(crate) fn advance(&mut self, waited: Duration) {
        self.state.elapsed += waited;
        self.state.attempt += 1;
    }

    /// Cancellation observed; `attempts` is how many attempts actually ran.
    pub(crate) fn cancelled(&self, attempts: u32) -> RetryError<E> {
        let last = self.state.last_failure();
        self.emit(
            Phase::Cancelled,
            None,
            Some(FailureKind::Cancelled),
            last.map(|r| r.error.to_string()),
        );
        RetryError::Cancelled { attempts }
    }

    /// The body of the current attempt was left without an outcome.
    pub(crate) fn abandoned(&self) -> RetryError<E> {
        self.emit(Phase::Abandoned, None, None, None);
        RetryError::Abandoned {
            attempt: self.state.attempt,
        }
    }

    fn emit(
        &self,
        phase: Phase,
        delay: Option<Duration>,
        kind: Option<FailureKind>,
        message: Option<String>,
    ) {
        self.observer.on_event(&RetryEvent {
            operation: self.operation,
            phase,
            attempt: self.state.attempt,
            delay,
            kind,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::retry::observe::TracingObserver;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(100))
            .jitter(false)
            .build()
            .unwrap()
    }

    #[test]
    fn retryable_failure_schedules_wait_and_keeps_record() {
        let p = policy(3);
        let mut inv: Invocation<'_, Failure> = Invocation::new(&p, &TracingObserver, "op");
        match inv.failed(Failure::fetch("down")) {
            Step::Wait(d) => assert_eq!(d, Duration::from_millis(10)),
            Step::Stop(e) => panic!("unexpected stop: {e}"),
        }
        assert_eq!(inv.state.last_failure().unwrap().attempt, 1);
        inv.advance(Duration::from_millis(10));
        assert_eq!(inv.attempt(), 2);
        assert_eq!(inv.state.elapsed(), Duration::from_millis(10));
    }

    #[test]
    fn exhaustion_carries_all_records() {
        let p = policy(2);
        let mut inv: Invocation<'_, Failure> = Invocation::new(&p, &TracingObserver, "op");
        assert!(matches!(inv.failed(Failure::fetch("one")), Step::Wait(_)));
        inv.advance(Duration::from_millis(10));
        match inv.failed(Failure::fetch("two")) {
            Step::Stop(RetryError::Exhausted(x)) => {
                assert_eq!(x.attempts_made(), 2);
                assert_eq!(x.causes().count(), 2);
                assert_eq!(x.elapsed(), Duration::from_millis(10));
            }
            _ => panic!("expected exhaustion"),
        }
    }

    #[test]
    fn non_retryable_is_returned_unchanged() {
        let p = policy(5);
        let mut inv: Invocation<'_, Failure> = Invocation::new(&p, &TracingObserver, "op");
        match inv.failed(Failure::signal_parse("garbled")) {
            Step::Stop(RetryError::Terminal(e)) => assert_eq!(e.message(), "garbled"),
            _ => panic!("expected terminal"),
        }
    }
}
