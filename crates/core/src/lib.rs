//! Core types for qsbackup
//!
//! This crate holds everything the other layers agree on:
//! - Domain types: RunId, AssetType, AssetRecord, BackupMode, Category
//! - Error taxonomy: RemoteError, FailureClass, ErrorKind, ConfigError, BackupError
//! - Run configuration with validation and fingerprinting
//! - Identity records (users, groups, memberships) and dated table references
//! - Document store attribute values
//! - Clock abstraction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod types;
pub mod value;

pub use clock::{system_clock, Clock, FixedClock, SharedClock, SystemClock};
pub use config::{
    BackupConfig, BackupConfigBuilder, ExportFormat, ExportOptions, PrefixFormat, RetryConfig,
    TimeoutConfig, UploadConfig,
};
pub use error::{BackupError, ConfigError, ErrorKind, FailureClass, RemoteError};
pub use identity::{derive_memberships, Group, IdentityTableRef, LogicalTable, Membership, User};
pub use types::{AssetRecord, AssetType, BackupMode, Category, RunId, SourceKind};
pub use value::{AttributeValue, Item};

/// Name written into object metadata and the manifest
pub const TOOL_NAME: &str = "qsbackup";

/// Crate version written into the manifest
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
