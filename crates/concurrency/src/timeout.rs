//! Per-call deadlines

use qsbackup_core::RemoteError;
use std::future::Future;
use std::time::Duration;

/// Run a remote call with a deadline
///
/// A call that overruns resolves to [`RemoteError::timeout`], which
/// classifies as a transient network failure.
pub async fn with_timeout<T, F>(deadline: Duration, operation: &str, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::timeout(operation)),
    }
}
