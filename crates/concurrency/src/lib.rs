//! Concurrency layer for qsbackup
//!
//! Scheduling primitives shared by the engine's units of work:
//! - RetryPolicy: exponential backoff with jitter and an attempt budget
//! - retry_transient: retry loop for whole-call operations
//! - WorkerPool: bounded concurrency over bundle and identity units
//! - SingleFlight: at most one initializer per key
//! - sleep_or_cancel / with_timeout: suspend points and call deadlines

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod cancel;
pub mod guard;
pub mod pool;
pub mod retry;
pub mod timeout;

pub use backoff::RetryPolicy;
pub use cancel::{check, sleep_or_cancel, Cancelled};
pub use guard::SingleFlight;
pub use pool::WorkerPool;
pub use retry::{retry_transient, RetryError};
pub use timeout::with_timeout;

// Re-export the token type so callers need not depend on tokio-util directly
pub use tokio_util::sync::CancellationToken;
