//! Errors produced by the retry executor.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::error::{Classify, FailureKind};

use super::state::FailureRecord;

/// Final outcome of a failed retrying invocation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Non-retryable failure, returned exactly as the operation produced it.
    Terminal(E),
    /// Every allowed attempt failed with a retryable kind.
    Exhausted(RetryExhausted<E>),
    /// The caller cancelled the invocation; no further attempts were made.
    Cancelled { attempts: u32 },
    /// A [`RetryScope`](super::RetryScope) body was left without reporting an
    /// outcome (early return or panic) during attempt `attempt`.
    Abandoned { attempt: u32 },
}

impl<E> RetryError<E> {
    /// Attempts made before this outcome (0 if cancelled before the first).
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RetryError::Terminal(_) => None,
            RetryError::Exhausted(x) => Some(x.attempts_made()),
            RetryError::Cancelled { attempts } => Some(*attempts),
            RetryError::Abandoned { attempt } => Some(*attempt),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    pub fn as_exhausted(&self) -> Option<&RetryExhausted<E>> {
        match self {
            RetryError::Exhausted(x) => Some(x),
            _ => None,
        }
    }

    /// The operation's own error: the terminal one, or the last one before exhaustion.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Terminal(e) => Some(e),
            RetryError::Exhausted(x) => Some(x.into_last()),
            RetryError::Cancelled { .. } | RetryError::Abandoned { .. } => None,
        }
    }
}

impl<E: Classify> Classify for RetryError<E> {
    fn kind(&self) -> FailureKind {
        match self {
            RetryError::Terminal(e) => e.kind(),
            RetryError::Exhausted(_) => FailureKind::RetryExhausted,
            RetryError::Cancelled { .. } | RetryError::Abandoned { .. } => {
                FailureKind::Cancelled
            }
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Terminal(e) => e.fmt(f),
            RetryError::Exhausted(x) => x.fmt(f),
            RetryError::Cancelled { attempts } => {
                write!(f, "cancelled after {} attempt(s)", attempts)
            }
            RetryError::Abandoned { attempt } => {
                write!(f, "retry scope abandoned during attempt {}", attempt)
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Terminal(e) => e.source(),
            RetryError::Exhausted(x) => x.source(),
            RetryError::Cancelled { .. } | RetryError::Abandoned { .. } => None,
        }
    }
}

/// Aggregate failure after the attempt budget ran out.
///
/// Holds every failure in attempt order; `source()` points at the last one, so
/// walking the source chain reaches the raw cause of the final attempt.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    attempts_made: u32,
    elapsed: Duration,
    earlier: Vec<FailureRecord<E>>,
    last: FailureRecord<E>,
}

impl<E> RetryExhausted<E> {
    pub(crate) fn new(
        attempts_made: u32,
        elapsed: Duration,
        earlier: Vec<FailureRecord<E>>,
        last: FailureRecord<E>,
    ) -> Self {
        Self {
            attempts_made,
            elapsed,
            earlier,
            last,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Total time spent waiting between attempts.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Failures in attempt order, first to last.
    pub fn causes(&self) -> impl Iterator<Item = &FailureRecord<E>> + '_ {
        self.earlier.iter().chain(std::iter::once(&self.last))
    }

    pub fn first(&self) -> &FailureRecord<E> {
        self.earlier.first().unwrap_or(&self.last)
    }

    pub fn last(&self) -> &FailureRecord<E> {
        &self.last
    }

    pub fn into_last(self) -> E {
        self.last.error
    }
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "retries exhausted after {} attempt(s): {}",
            self.attempts_made, self.last.error
        )
    }
}

impl<E: Error + 'static> Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.last.error)
    }
}
