//! In-memory export service
//!
//! Jobs advance one state per `describe_export` call: `QUEUED` on the first
//! poll, `IN_PROGRESS` until the configured number of polls has passed,
//! then `SUCCESSFUL` (or `FAILED` when a job failure was scripted for that
//! job id at submission). Archives are deterministic byte strings.

use crate::memory::faults::FaultScript;
use crate::traits::{ArchiveHandle, AssetExportService, ExportRequest, RemoteJobStatus};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use qsbackup_core::{AssetRecord, AssetType, RemoteError};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

const DEFAULT_ARCHIVE_SIZE: usize = 2048;

#[derive(Debug)]
struct JobRecord {
    polls: u32,
    failure: Option<RemoteError>,
    hanging: bool,
    size: usize,
}

/// Export service backed by process memory
#[derive(Debug, Default)]
pub struct MemoryExportService {
    assets: DashMap<AssetType, Vec<AssetRecord>>,
    jobs: DashMap<String, JobRecord>,
    archives: DashMap<String, Bytes>,
    requests: Mutex<Vec<ExportRequest>>,
    submissions: Mutex<Vec<String>>,
    hanging: Mutex<Vec<String>>,
    archive_sizes: Mutex<Vec<(String, usize)>>,
    polls_until_done: AtomicU32,
    describe_calls: AtomicUsize,
    /// Faults for `list_assets`, keyed by the type's plural name
    pub list_faults: FaultScript,
    /// Faults for `start_export`, keyed by job id
    pub submit_faults: FaultScript,
    /// Remote job failures, keyed by job id and fixed at submission
    pub job_failures: FaultScript,
    /// Faults for `download_archive`, keyed by job id
    pub download_faults: FaultScript,
    /// Faults for `check_access`, keyed by `""`
    pub access_faults: FaultScript,
}

impl MemoryExportService {
    /// Create an empty service
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset to its type's listing
    pub fn add_asset(&self, asset: AssetRecord) {
        self.assets.entry(asset.asset_type).or_default().push(asset);
    }

    /// Add several assets
    pub fn add_assets(&self, assets: impl IntoIterator<Item = AssetRecord>) {
        for asset in assets {
            self.add_asset(asset);
        }
    }

    /// Number of polls a job stays unfinished
    pub fn set_polls_until_done(&self, polls: u32) {
        self.polls_until_done.store(polls, Ordering::SeqCst);
    }

    /// Jobs whose id starts with `prefix` never finish
    pub fn hang_jobs(&self, prefix: &str) {
        self.hanging.lock().push(prefix.to_string());
    }

    /// Archives for jobs whose id starts with `prefix` are `size` bytes
    pub fn set_archive_size(&self, prefix: &str, size: usize) {
        self.archive_sizes.lock().push((prefix.to_string(), size));
    }

    /// Every job id passed to `start_export`, accepted or not
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().clone()
    }

    /// Submissions whose job id starts with `prefix`
    pub fn submissions_for(&self, prefix: &str) -> usize {
        self.submissions
            .lock()
            .iter()
            .filter(|id| id.starts_with(prefix))
            .count()
    }

    /// Accepted export requests
    pub fn requests(&self) -> Vec<ExportRequest> {
        self.requests.lock().clone()
    }

    /// Number of `describe_export` calls
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    fn archive_size(&self, job_id: &str) -> usize {
        self.archive_sizes
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| job_id.starts_with(p.as_str()))
            .map(|(_, s)| *s)
            .unwrap_or(DEFAULT_ARCHIVE_SIZE)
    }

    fn handle_for(job_id: &str) -> ArchiveHandle {
        ArchiveHandle(format!("memory://exports/{}.zip", job_id))
    }

    fn job_id_of(handle: &ArchiveHandle) -> &str {
        handle
            .as_str()
            .trim_start_matches("memory://exports/")
            .trim_end_matches(".zip")
    }
}

/// Deterministic archive body of `size` bytes
fn archive_bytes(job_id: &str, size: usize) -> Bytes {
    let seed = job_id.as_bytes();
    if seed.is_empty() {
        return Bytes::from(vec![0u8; size]);
    }
    Bytes::from(seed.iter().copied().cycle().take(size).collect::<Vec<u8>>())
}

#[async_trait]
impl AssetExportService for MemoryExportService {
    async fn list_assets(&self, asset_type: AssetType) -> Result<Vec<AssetRecord>, RemoteError> {
        self.list_faults.check(asset_type.plural())?;
        Ok(self
            .assets
            .get(&asset_type)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn start_export(&self, request: &ExportRequest) -> Result<(), RemoteError> {
        self.submissions.lock().push(request.job_id.clone());
        self.submit_faults.check(&request.job_id)?;
        if self.jobs.contains_key(&request.job_id) {
            return Err(RemoteError::new(
                "ResourceExistsException",
                format!("job {} already exists", request.job_id),
            ));
        }
        let hanging = self
            .hanging
            .lock()
            .iter()
            .any(|p| request.job_id.starts_with(p.as_str()));
        self.jobs.insert(
            request.job_id.clone(),
            JobRecord {
                polls: 0,
                failure: self.job_failures.next(&request.job_id),
                hanging,
                size: self.archive_size(&request.job_id),
            },
        );
        self.requests.lock().push(request.clone());
        Ok(())
    }

    async fn describe_export(&self, job_id: &str) -> Result<RemoteJobStatus, RemoteError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let polls_until_done = self.polls_until_done.load(Ordering::SeqCst);
        let mut job = self.jobs.get_mut(job_id).ok_or_else(|| {
            RemoteError::new("ResourceNotFoundException", format!("no job {}", job_id))
        })?;
        job.polls += 1;
        if job.hanging || job.polls <= polls_until_done {
            return Ok(if job.polls == 1 {
                RemoteJobStatus::Queued
            } else {
                RemoteJobStatus::InProgress
            });
        }
        if let Some(error) = &job.failure {
            return Ok(RemoteJobStatus::Failed {
                error: error.clone(),
            });
        }
        let handle = Self::handle_for(job_id);
        let size = job.size;
        drop(job);
        self.archives
            .entry(handle.as_str().to_string())
            .or_insert_with(|| archive_bytes(job_id, size));
        Ok(RemoteJobStatus::Successful { handle })
    }

    async fn download_archive(&self, handle: &ArchiveHandle) -> Result<Bytes, RemoteError> {
        self.download_faults.check(Self::job_id_of(handle))?;
        self.archives
            .get(handle.as_str())
            .map(|b| b.clone())
            .ok_or_else(|| RemoteError::new("ResourceNotFoundException", format!("no archive {}", handle.as_str())))
    }

    async fn check_access(&self) -> Result<(), RemoteError> {
        self.access_faults.check("")
    }
}
