//! Export job driver
//!
//! Drives one bundle's export through the remote service:
//!
//! ```text
//! PENDING -> SUBMITTING -> POLLING -> SUCCEEDED
//!                 ^           |
//!                 |           v
//!                 +------ FAILED (retryable, attempts left)
//! ```
//!
//! Every submission is a new attempt with its own job id. Throttled and
//! transient failures go back to SUBMITTING after a backoff while the
//! attempt budget lasts. Permission and not-found failures end the job on
//! the spot. Cancellation is observed before each submission and at every
//! sleep.
//!
//! The driver never touches object storage; a succeeded job carries the
//! handle the caller downloads the archive from.

use chrono::{DateTime, Utc};
use qsbackup_concurrency::{check, sleep_or_cancel, with_timeout, CancellationToken, RetryPolicy};
use qsbackup_core::config::{ExportOptions, TimeoutConfig};
use qsbackup_core::{Clock, ErrorKind, FailureClass, RemoteError};
use qsbackup_primitives::{export_job_id, Bundle};
use qsbackup_storage::{ArchiveHandle, AssetExportService, ExportRequest, RemoteJobStatus};
use serde::Serialize;
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Not yet submitted
    Pending,
    /// Submission in flight
    Submitting,
    /// Waiting for the remote job to finish
    Polling,
    /// Archive ready
    Succeeded,
    /// Terminal failure
    Failed,
    /// Stopped by run cancellation before reaching a verdict
    Cancelled,
}

impl JobState {
    /// Whether the job will not change state again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Submitting => "SUBMITTING",
            JobState::Polling => "POLLING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// The failure that ended a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    /// Kind recorded in the manifest
    pub kind: ErrorKind,
    /// Retry class of the underlying failure
    pub class: FailureClass,
    /// Remote error from the last attempt
    pub source: RemoteError,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.source)
    }
}

/// One bundle's export, owned by its driver
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Job id of the latest attempt, empty before the first submission
    pub job_id: String,
    /// Bundle reference, e.g. `datasets#2`
    pub bundle_ref: String,
    /// Current state
    pub state: JobState,
    /// Submissions made so far
    pub attempt_count: u32,
    /// Archive handle once succeeded
    pub archive_handle: Option<ArchiveHandle>,
    /// Cause of a terminal failure
    pub error: Option<JobError>,
    /// When the remote export reported success
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExportJob {
    fn new(bundle: &Bundle) -> Self {
        ExportJob {
            job_id: String::new(),
            bundle_ref: bundle.reference(),
            state: JobState::Pending,
            attempt_count: 0,
            archive_handle: None,
            error: None,
            finished_at: None,
        }
    }
}

/// Where an attempt failed; decides what counts as retryable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Submit,
    Poll,
}

enum AttemptResult {
    Succeeded(ArchiveHandle),
    Failed(Phase, RemoteError),
    Cancelled,
}

/// Drives export jobs against one service
pub struct ExportJobDriver<'a> {
    service: &'a dyn AssetExportService,
    options: &'a ExportOptions,
    timeouts: &'a TimeoutConfig,
    policy: &'a RetryPolicy,
    clock: &'a dyn Clock,
    token: &'a CancellationToken,
}

impl<'a> ExportJobDriver<'a> {
    /// Create a driver
    pub fn new(
        service: &'a dyn AssetExportService,
        options: &'a ExportOptions,
        timeouts: &'a TimeoutConfig,
        policy: &'a RetryPolicy,
        clock: &'a dyn Clock,
        token: &'a CancellationToken,
    ) -> Self {
        ExportJobDriver {
            service,
            options,
            timeouts,
            policy,
            clock,
            token,
        }
    }

    /// Run `bundle`'s export to a terminal state
    pub async fn drive(&self, bundle: &Bundle) -> ExportJob {
        let mut job = ExportJob::new(bundle);

        loop {
            if check(self.token).is_err() {
                job.state = JobState::Cancelled;
                return job;
            }

            job.attempt_count += 1;
            job.state = JobState::Submitting;
            job.job_id = export_job_id(
                bundle.asset_type,
                bundle.index,
                self.clock.now().timestamp(),
                job.attempt_count,
            );

            let (phase, error) = match self.attempt(bundle, &mut job).await {
                AttemptResult::Succeeded(handle) => {
                    job.state = JobState::Succeeded;
                    job.archive_handle = Some(handle);
                    job.finished_at = Some(self.clock.now());
                    info!(
                        bundle = %job.bundle_ref,
                        job_id = %job.job_id,
                        attempt = job.attempt_count,
                        "export succeeded"
                    );
                    return job;
                }
                AttemptResult::Cancelled => {
                    job.state = JobState::Cancelled;
                    return job;
                }
                AttemptResult::Failed(phase, error) => (phase, error),
            };

            let class = error.classify();
            let retryable = match phase {
                // An unclassified submission failure is worth another try;
                // an unclassified remote job failure is not.
                Phase::Submit => !class.is_terminal(),
                Phase::Poll => class.is_retryable(),
            };

            if !retryable || !self.policy.allows_another(job.attempt_count) {
                let kind = match (phase, class) {
                    (Phase::Submit, FailureClass::Unknown) => ErrorKind::SubmissionFailed,
                    _ => ErrorKind::from(class),
                };
                warn!(
                    bundle = %job.bundle_ref,
                    job_id = %job.job_id,
                    attempt = job.attempt_count,
                    %kind,
                    error = %error,
                    "export failed"
                );
                job.state = JobState::Failed;
                job.error = Some(JobError {
                    kind,
                    class,
                    source: error,
                });
                return job;
            }

            let delay = self.policy.delay(job.attempt_count);
            warn!(
                bundle = %job.bundle_ref,
                attempt = job.attempt_count,
                %class,
                delay_ms = delay.as_millis() as u64,
                "export attempt failed, retrying"
            );
            if sleep_or_cancel(delay, self.token).await.is_err() {
                job.state = JobState::Cancelled;
                return job;
            }
        }
    }

    async fn attempt(&self, bundle: &Bundle, job: &mut ExportJob) -> AttemptResult {
        let request = ExportRequest {
            job_id: job.job_id.clone(),
            asset_type: bundle.asset_type,
            asset_arns: bundle.asset_arns.clone(),
            options: self.options.clone(),
        };
        let submitted = with_timeout(
            self.timeouts.call_timeout,
            "start_export",
            self.service.start_export(&request),
        )
        .await;
        if let Err(e) = submitted {
            return AttemptResult::Failed(Phase::Submit, e);
        }

        job.state = JobState::Polling;
        debug!(bundle = %job.bundle_ref, job_id = %job.job_id, "export submitted");
        let deadline = Instant::now() + self.timeouts.max_poll_wait;

        loop {
            if sleep_or_cancel(self.timeouts.poll_interval, self.token)
                .await
                .is_err()
            {
                return AttemptResult::Cancelled;
            }

            let status = with_timeout(
                self.timeouts.call_timeout,
                "describe_export",
                self.service.describe_export(&job.job_id),
            )
            .await;

            match status {
                Ok(RemoteJobStatus::Successful { handle }) => return AttemptResult::Succeeded(handle),
                Ok(RemoteJobStatus::Failed { error }) => return AttemptResult::Failed(Phase::Poll, error),
                Ok(status) => {
                    debug!(job_id = %job.job_id, ?status, "export pending");
                }
                Err(e) if e.is_retryable() => {
                    debug!(job_id = %job.job_id, error = %e, "status check failed, polling again");
                }
                Err(e) => return AttemptResult::Failed(Phase::Poll, e),
            }

            if Instant::now() >= deadline {
                return AttemptResult::Failed(
                    Phase::Poll,
                    RemoteError::new(
                        "RequestTimeout",
                        format!(
                            "export {} did not finish within {}s",
                            job.job_id,
                            self.timeouts.max_poll_wait.as_secs_f64()
                        ),
                    ),
                );
            }
        }
    }
}
