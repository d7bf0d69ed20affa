//! Backup orchestration engine for qsbackup
//!
//! This crate runs a backup end to end on top of the storage traits:
//! - ExportJobDriver: per-bundle export state machine with polling and retry
//! - ArchivePublisher: single or multipart upload followed by verification
//! - IdentityWriter: dated identity tables, batched writes, partial retries
//! - OutcomeAggregator: per-category results, finalized into a BackupReport
//! - BackupEngine: `run`, `run_with_cancellation` and `validate`
//!
//! # Example
//!
//! ```ignore
//! use qsbackup_engine::{BackupEngine, ServiceClients};
//!
//! let engine = BackupEngine::new(clients);
//! let report = engine.run(&config, BackupMode::Full).await?;
//! for (category, result) in &report.categories {
//!     println!("{}: {}/{}", category, result.succeeded, result.attempted);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod export_job;
pub mod identity_writer;
pub mod outcome;
pub mod publisher;

pub use engine::{BackupEngine, ServiceCheck, ServiceClients, ValidationResult};
pub use export_job::{ExportJob, ExportJobDriver, JobError, JobState};
pub use identity_writer::{IdentityWriter, TableGuard};
pub use outcome::{
    BackupReport, CategoryResult, CategoryStatus, ErrorEntry, ExclusionEntry, IdentityOutcome,
    Note, OutcomeAggregator, RunMetadata, RunStatistics,
};
pub use publisher::{checksum, ArchivePublisher, ArchiveUploadResult, PublishError};
