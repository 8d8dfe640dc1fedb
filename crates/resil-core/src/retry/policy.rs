use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Classify, FailureKind, KindSet};

use super::backoff;

/// Decision returned by the retry policy for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The failure kind is not retryable; surface it as-is.
    Terminal,
    /// Retryable, but the attempt budget is spent.
    Exhausted,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Invalid policy values. Always a programmer error; never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("max_delay ({max:?}) is shorter than initial_delay ({initial:?})")]
    MaxBelowInitial { initial: Duration, max: Duration },
    #[error("backoff_multiplier must be a finite number >= 1.0, got {0}")]
    BadMultiplier(f64),
}

impl Classify for PolicyError {
    fn kind(&self) -> FailureKind {
        FailureKind::Configuration
    }
}

type KindPredicate = dyn Fn(FailureKind) -> bool + Send + Sync;

/// Which failure kinds qualify for another attempt.
#[derive(Clone)]
pub enum Retryable {
    /// Enumerated set, resolved when the policy is built.
    Kinds(KindSet),
    /// Arbitrary rule over the kind.
    Predicate(Arc<KindPredicate>),
}

impl Retryable {
    fn matches(&self, kind: FailureKind) -> bool {
        if kind.is_always_terminal() {
            return false;
        }
        match self {
            Retryable::Kinds(set) => set.contains(kind),
            Retryable::Predicate(p) => (**p)(kind),
        }
    }
}

impl fmt::Debug for Retryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retryable::Kinds(set) => f.debug_tuple("Kinds").field(set).finish(),
            Retryable::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Kinds retried when the caller does not say otherwise.
pub fn default_retryable_kinds() -> KindSet {
    KindSet::of(&[
        FailureKind::DataFetch,
        FailureKind::Api,
        FailureKind::ApiTimeout,
        FailureKind::ApiRateLimit,
        FailureKind::LlmResponse,
        FailureKind::AgentTimeout,
    ])
}

/// Exponential backoff policy with a ceiling and optional full jitter.
///
/// Immutable once built; clone it or share a reference across any number of
/// concurrent invocations. Construct through [`RetryPolicy::builder`] so the
/// values are validated.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter_enabled: bool,
    retryable: Retryable,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            retryable: Retryable::Kinds(default_retryable_kinds()),
        }
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Policy that makes exactly one attempt. Failures are still classified.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            retryable: Retryable::Kinds(KindSet::empty()),
            ..Self::default()
        }
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn jitter_enabled(&self) -> bool {
        self.jitter_enabled
    }

    pub fn retryable(&self) -> &Retryable {
        &self.retryable
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retryable.matches(kind)
    }

    /// Decide what to do after attempt `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if !self.is_retryable(kind) {
            return RetryDecision::Terminal;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(backoff::compute_delay(attempt, self))
    }

    /// Builder pre-filled with this policy's values.
    pub fn to_builder(&self) -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter_enabled: self.jitter_enabled,
            retryable: self.retryable.clone(),
        }
    }
}

/// Validating builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter_enabled: bool,
    retryable: Retryable,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        RetryPolicy::default().to_builder()
    }
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_delay = d;
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.backoff_multiplier = m;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Replace the retryable set.
    pub fn retry_on(mut self, kinds: KindSet) -> Self {
        self.retryable = Retryable::Kinds(kinds);
        self
    }

    /// Add one kind to the retryable set. Turns a predicate rule back into a
    /// set containing only `kind`.
    pub fn also_retry(mut self, kind: FailureKind) -> Self {
        let mut set = match self.retryable {
            Retryable::Kinds(set) => set,
            Retryable::Predicate(_) => KindSet::empty(),
        };
        set.insert(kind);
        self.retryable = Retryable::Kinds(set);
        self
    }

    /// Use an arbitrary rule instead of a set.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(FailureKind) -> bool + Send + Sync + 'static,
    {
        self.retryable = Retryable::Predicate(Arc::new(predicate));
        self
    }

    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if self.max_delay < self.initial_delay {
            return Err(PolicyError::MaxBelowInitial {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PolicyError::BadMultiplier(self.backoff_multiplier));
        }

        let retryable = match self.retryable {
            Retryable::Kinds(mut set) => {
                let stripped: Vec<FailureKind> =
                    set.iter().filter(|k| k.is_always_terminal()).collect();
                for kind in stripped {
                    tracing::warn!(kind = %kind, "ignoring non-retryable kind in retry set");
                    set.remove(kind);
                }
                Retryable::Kinds(set)
            }
            predicate => predicate,
        };

        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter_enabled: self.jitter_enabled,
            retryable,
        })
    }
}
