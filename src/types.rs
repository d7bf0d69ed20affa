//! Public types for the qsbackup API.
//!
//! This module re-exports types from the member crates with a flat public
//! interface.

// Configuration
pub use qsbackup_core::config::{
    AwsConfig, ConcurrencyConfig, IdentityConfig, StorageConfig, TableNames,
};
pub use qsbackup_core::{
    BackupConfig, BackupConfigBuilder, ExportFormat, ExportOptions, PrefixFormat, RetryConfig,
    TimeoutConfig, UploadConfig,
};

// Domain records
pub use qsbackup_core::{
    AssetRecord, AssetType, BackupMode, Category, Group, IdentityTableRef, LogicalTable,
    Membership, RunId, SourceKind, User,
};
pub use qsbackup_core::{AttributeValue, Item};

// Failure taxonomy
pub use qsbackup_core::{ErrorKind, FailureClass, RemoteError};

// Time
pub use qsbackup_core::{Clock, FixedClock, SharedClock, SystemClock};

// Cancellation
pub use qsbackup_concurrency::CancellationToken;

// Engine surface
pub use qsbackup_engine::{
    BackupEngine, BackupReport, CategoryResult, CategoryStatus, ErrorEntry, ExclusionEntry, Note,
    RunMetadata, RunStatistics, ServiceCheck, ServiceClients, ValidationResult,
};

// Filtering
pub use qsbackup_primitives::ExclusionReason;
