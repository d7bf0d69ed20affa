//! Generic retry loop for remote calls
//!
//! Used where a call either succeeds or fails as a whole: listings,
//! archive downloads, table creation. Units with richer state machines
//! (export jobs, multipart uploads, partial batch writes) drive their own
//! loops with the same [`RetryPolicy`].

use crate::backoff::RetryPolicy;
use crate::cancel::{check, sleep_or_cancel, Cancelled};
use qsbackup_core::RemoteError;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Why a retried call did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Cancelled before or between attempts
    #[error("cancelled")]
    Cancelled,

    /// The last attempt failed and no further attempt was allowed
    #[error("failed after {attempts} attempt(s): {error}")]
    Failed {
        /// Error from the last attempt
        error: RemoteError,
        /// Attempts made
        attempts: u32,
    },
}

impl From<Cancelled> for RetryError {
    fn from(_: Cancelled) -> Self {
        RetryError::Cancelled
    }
}

impl RetryError {
    /// Check if the loop stopped because of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

/// Call `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts run out
///
/// `op` receives the 1-based attempt number. Only throttled and transient
/// failures are retried.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 1;
    loop {
        check(token)?;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() || !policy.allows_another(attempt) {
                    return Err(RetryError::Failed {
                        error,
                        attempts: attempt,
                    });
                }
                let delay = policy.delay(attempt);
                warn!(
                    operation = label,
                    attempt,
                    code = %error.code,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient failure"
                );
                sleep_or_cancel(delay, token).await?;
                attempt += 1;
            }
        }
    }
}
