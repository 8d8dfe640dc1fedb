pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use cancel::CancelToken;
pub use error::{Classify, Failure, FailureKind, KindSet};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
