//! # qsbackup
//!
//! Backup orchestration for a hosted BI service's configuration.
//!
//! A run backs up users, groups and their memberships into date-prefixed
//! document-store tables, and exports datasources, datasets, analyses and
//! dashboards as bundle archives into date-partitioned object storage. Every
//! outcome lands in a manifest that the caller can write as JSON or text.
//!
//! ## Quick Start
//!
//! ```ignore
//! use qsbackup::prelude::*;
//!
//! let config = BackupConfig::builder()
//!     .account_id("123456789012")
//!     .bucket("bi-backups")
//!     .build()?;
//!
//! let engine = BackupEngine::new(clients);
//! let report = engine.run(&config, BackupMode::Full).await?;
//! report.write_manifest("backup-manifest.json")?;
//! report.write_report("backup-report.txt")?;
//! ```
//!
//! ## Layers
//!
//! - `qsbackup-core` - configuration, error taxonomy, domain records
//! - `qsbackup-concurrency` - retry policy, worker pool, single-flight guard
//! - `qsbackup-primitives` - catalog filter, bundle planner, key naming
//! - `qsbackup-storage` - remote service traits and in-memory implementations
//! - `qsbackup-engine` - export jobs, publishing, identity tables, manifests
//!
//! Remote services are reached through the traits in [`storage`]; the
//! in-memory implementations there are what the test suites run against.

#![warn(missing_docs)]

mod error;
mod types;

pub mod prelude;

pub use error::{Error, Result};
pub use types::*;

/// Remote service traits and in-memory implementations
pub mod storage {
    pub use qsbackup_storage::*;
}

/// Engine building blocks, for callers composing their own runs
pub mod engine {
    pub use qsbackup_engine::*;
}
