//! Failure taxonomy shared by every retryable operation.
//!
//! Classification is structural: a failure carries a [`FailureKind`] tag and an
//! optional wrapped cause. Retry decisions look only at the kind, never at the
//! message text, so they stay deterministic regardless of how the underlying
//! error formats itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of failure kinds.
///
/// Operation code maps its own errors onto these (see [`Classify`]); a
/// [`RetryPolicy`](crate::retry::RetryPolicy) then names which kinds are worth
/// another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Invalid configuration or policy values (programmer error).
    Configuration,
    /// Input rejected by a validator.
    Validation,
    /// Fetching data from a source failed (network, I/O).
    DataFetch,
    /// Data arrived but could not be parsed.
    DataParse,
    /// Remote API call failed.
    Api,
    /// Remote API call timed out.
    ApiTimeout,
    /// Remote API asked us to slow down (e.g. HTTP 429).
    ApiRateLimit,
    /// LLM returned an unusable response.
    LlmResponse,
    /// LLM output could not be parsed.
    LlmParse,
    /// Agent step exceeded its time allowance.
    AgentTimeout,
    /// External tool or process failed.
    Tool,
    /// External tool does not exist.
    ToolNotFound,
    /// Unknown market identifier.
    InvalidMarket,
    /// Unknown instrument symbol.
    InvalidSymbol,
    /// Trading signal could not be parsed.
    SignalParse,
    /// Factor definition could not be parsed.
    FactorParse,
    /// Anything that does not map onto a more specific kind.
    Other,
    /// The invocation was cancelled by its caller.
    Cancelled,
    /// Synthesized by the executor when every allowed attempt failed.
    RetryExhausted,
}

/// Coarse grouping of kinds, one per parent error family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureFamily {
    Config,
    Validation,
    DataSource,
    Api,
    Llm,
    Agent,
    Tool,
    Market,
    Signal,
    Factor,
    Control,
    Other,
}

impl FailureKind {
    pub const ALL: [FailureKind; 19] = [
        FailureKind::Configuration,
        FailureKind::Validation,
        FailureKind::DataFetch,
        FailureKind::DataParse,
        FailureKind::Api,
        FailureKind::ApiTimeout,
        FailureKind::ApiRateLimit,
        FailureKind::LlmResponse,
        FailureKind::LlmParse,
        FailureKind::AgentTimeout,
        FailureKind::Tool,
        FailureKind::ToolNotFound,
        FailureKind::InvalidMarket,
        FailureKind::InvalidSymbol,
        FailureKind::SignalParse,
        FailureKind::FactorParse,
        FailureKind::Other,
        FailureKind::Cancelled,
        FailureKind::RetryExhausted,
    ];

    /// Stable snake_case name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Validation => "validation",
            FailureKind::DataFetch => "data_fetch",
            FailureKind::DataParse => "data_parse",
            FailureKind::Api => "api",
            FailureKind::ApiTimeout => "api_timeout",
            FailureKind::ApiRateLimit => "api_rate_limit",
            FailureKind::LlmResponse => "llm_response",
            FailureKind::LlmParse => "llm_parse",
            FailureKind::AgentTimeout => "agent_timeout",
            FailureKind::Tool => "tool",
            FailureKind::ToolNotFound => "tool_not_found",
            FailureKind::InvalidMarket => "invalid_market",
            FailureKind::InvalidSymbol => "invalid_symbol",
            FailureKind::SignalParse => "signal_parse",
            FailureKind::FactorParse => "factor_parse",
            FailureKind::Other => "other",
            FailureKind::Cancelled => "cancelled",
            FailureKind::RetryExhausted => "retry_exhausted",
        }
    }

    pub fn family(self) -> FailureFamily {
        match self {
            FailureKind::Configuration => FailureFamily::Config,
            FailureKind::Validation => FailureFamily::Validation,
            FailureKind::DataFetch | FailureKind::DataParse => FailureFamily::DataSource,
            FailureKind::Api | FailureKind::ApiTimeout | FailureKind::ApiRateLimit => {
                FailureFamily::Api
            }
            FailureKind::LlmResponse | FailureKind::LlmParse => FailureFamily::Llm,
            FailureKind::AgentTimeout => FailureFamily::Agent,
            FailureKind::Tool | FailureKind::ToolNotFound => FailureFamily::Tool,
            FailureKind::InvalidMarket | FailureKind::InvalidSymbol => FailureFamily::Market,
            FailureKind::SignalParse => FailureFamily::Signal,
            FailureKind::FactorParse => FailureFamily::Factor,
            FailureKind::Cancelled | FailureKind::RetryExhausted => FailureFamily::Control,
            FailureKind::Other => FailureFamily::Other,
        }
    }

    /// Kinds that are never retried, whatever a policy says.
    ///
    /// Programmer errors (bad configuration or input), cancellation, and the
    /// executor's own exhaustion error all fall in this class.
    pub fn is_always_terminal(self) -> bool {
        matches!(
            self,
            FailureKind::Configuration
                | FailureKind::Validation
                | FailureKind::Cancelled
                | FailureKind::RetryExhausted
        )
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a kind name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown failure kind: {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for FailureKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().replace('-', "_").to_ascii_lowercase();
        FailureKind::ALL
            .into_iter()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Compact set of [`FailureKind`]s backed by a bit mask.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KindSet(u32);

impl KindSet {
    pub const fn empty() -> Self {
        KindSet(0)
    }

    pub fn all() -> Self {
        FailureKind::ALL.into_iter().collect()
    }

    pub fn of(kinds: &[FailureKind]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn insert(&mut self, kind: FailureKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: FailureKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: FailureKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Kinds in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = FailureKind> + '_ {
        FailureKind::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

impl FromIterator<FailureKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = FailureKind>>(iter: I) -> Self {
        let mut set = KindSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Debug for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Maps an error value onto a [`FailureKind`].
pub trait Classify {
    fn kind(&self) -> FailureKind;
}

/// Domain error: a kind, a human-readable message, and an optional cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it reachable through `source()`.
    pub fn wrap<E>(kind: FailureKind, message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(FailureKind::DataFetch, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::DataParse, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Api, message)
    }

    pub fn signal_parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::SignalParse, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl Classify for Failure {
    fn kind(&self) -> FailureKind {
        self.kind
    }
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        let kind = classify_io(&e);
        Failure::wrap(kind, "i/o error", e)
    }
}

impl Classify for io::Error {
    fn kind(&self) -> FailureKind {
        classify_io(self)
    }
}

/// Classify an HTTP status code.
pub fn classify_http_status(code: u16) -> FailureKind {
    match code {
        429 => FailureKind::ApiRateLimit,
        408 | 504 => FailureKind::ApiTimeout,
        500..=599 => FailureKind::Api,
        400..=499 => FailureKind::Validation,
        _ => FailureKind::Other,
    }
}

/// Classify an I/O error by its [`io::ErrorKind`].
pub fn classify_io(e: &io::Error) -> FailureKind {
    use io::ErrorKind as K;
    match e.kind() {
        K::TimedOut => FailureKind::ApiTimeout,
        K::ConnectionRefused
        | K::ConnectionReset
        | K::ConnectionAborted
        | K::NotConnected
        | K::BrokenPipe
        | K::UnexpectedEof
        | K::Interrupted
        | K::WouldBlock => FailureKind::DataFetch,
        K::InvalidData => FailureKind::DataParse,
        K::InvalidInput => FailureKind::Validation,
        _ => FailureKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn kind_names_roundtrip_through_from_str() {
        for kind in FailureKind::ALL {
            assert_eq!(kind.as_str().parse::<FailureKind>().unwrap(), kind);
        }
        assert_eq!("API-Timeout".parse::<FailureKind>().unwrap(), FailureKind::ApiTimeout);
        assert!("nope".parse::<FailureKind>().is_err());
    }

    #[test]
    fn families_follow_parent_errors() {
        assert_eq!(FailureKind::DataFetch.family(), FailureFamily::DataSource);
        assert_eq!(FailureKind::DataParse.family(), FailureFamily::DataSource);
        assert_eq!(FailureKind::ApiRateLimit.family(), FailureFamily::Api);
        assert_eq!(FailureKind::InvalidSymbol.family(), FailureFamily::Market);
        assert_eq!(FailureKind::Cancelled.family(), FailureFamily::Control);
    }

    #[test]
    fn kind_set_membership() {
        let mut set = KindSet::of(&[FailureKind::Api, FailureKind::DataFetch]);
        assert!(set.contains(FailureKind::Api));
        assert!(!set.contains(FailureKind::Tool));
        assert_eq!(set.len(), 2);
        set.remove(FailureKind::Api);
        assert!(!set.contains(FailureKind::Api));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![FailureKind::DataFetch]);
        assert_eq!(KindSet::all().len(), FailureKind::ALL.len());
        assert!(KindSet::empty().is_empty());
    }

    #[test]
    fn http_status_classification() {
        assert_eq!(classify_http_status(429), FailureKind::ApiRateLimit);
        assert_eq!(classify_http_status(504), FailureKind::ApiTimeout);
        assert_eq!(classify_http_status(502), FailureKind::Api);
        assert_eq!(classify_http_status(404), FailureKind::Validation);
        assert_eq!(classify_http_status(302), FailureKind::Other);
    }

    #[test]
    fn io_errors_map_to_kinds() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(timeout.kind(), io::ErrorKind::TimedOut);
        assert_eq!(Classify::kind(&timeout), FailureKind::ApiTimeout);
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(classify_io(&reset), FailureKind::DataFetch);
        let perm = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert_eq!(classify_io(&perm), FailureKind::Other);
    }

    #[test]
    fn wrapped_cause_is_reachable() {
        let raw = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");
        let failure = Failure::wrap(FailureKind::DataFetch, "quote feed", raw);
        assert_eq!(failure.to_string(), "data_fetch: quote feed");
        let source = failure.source().expect("source");
        assert_eq!(source.to_string(), "peer reset");
        assert!(failure.cause().is_some());
    }
}
