//! Retry and backoff.
//!
//! A [`RetryPolicy`] says how long to wait and which failure kinds deserve
//! another attempt; [`RetryExecutor`] runs the loop in blocking or cooperative
//! mode; [`retrying`] and [`RetryScope`] adapt callables and imperative blocks
//! onto the executor.

mod backoff;
mod error;
mod observe;
mod policy;
mod run;
mod scope;
mod state;
mod wrap;

pub use backoff::{capped_delay, compute_delay, compute_delay_with, schedule};
pub use error::{RetryError, RetryExhausted};
pub use observe::{FnObserver, Phase, RetryEvent, RetryObserver, TracingObserver};
pub use policy::{
    default_retryable_kinds, PolicyError, RetryDecision, RetryPolicy, RetryPolicyBuilder,
    Retryable,
};
pub use run::{run_with_retry, run_with_retry_async, RetryExecutor};
pub use scope::{Attempt, RetryScope};
pub use state::{FailureRecord, RetryState};
pub use wrap::{retrying, Retrying};
