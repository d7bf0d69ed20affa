//! Remote service seams
//!
//! The engine talks to four remote capabilities. Each is a trait so the
//! engine can run against real clients or the in-memory implementations in
//! [`crate::memory`]. Every call returns a [`RemoteError`] value on failure;
//! retry and classification happen in the engine.
//!
//! | Trait | Backs |
//! |-------|-------|
//! | [`AssetExportService`] | asset listing and asynchronous bundle export |
//! | [`IdentityDirectory`] | user, group and member listing |
//! | [`ObjectStore`] | archive storage, single put and multipart |
//! | [`DocumentStore`] | dated identity tables |

use async_trait::async_trait;
use bytes::Bytes;
use qsbackup_core::{AssetRecord, AssetType, ExportOptions, Group, Item, RemoteError, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque reference to a finished export's archive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveHandle(pub String);

impl ArchiveHandle {
    /// Borrow the underlying reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A request to export one bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Caller-chosen job id, unique per attempt
    pub job_id: String,
    /// Asset type of every ARN
    pub asset_type: AssetType,
    /// Assets to export
    pub asset_arns: Vec<String>,
    /// Dependency, permission, tag and format options
    pub options: ExportOptions,
}

/// Remote status of an export job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobStatus {
    /// Accepted, not started
    Queued,
    /// Running
    InProgress,
    /// Finished; the archive can be fetched
    Successful {
        /// Where to fetch the archive
        handle: ArchiveHandle,
    },
    /// Finished without an archive
    Failed {
        /// Reported cause
        error: RemoteError,
    },
}

/// Asset listing and bundle export
#[async_trait]
pub trait AssetExportService: Send + Sync {
    /// List every asset of one type, in discovery order
    async fn list_assets(&self, asset_type: AssetType) -> Result<Vec<AssetRecord>, RemoteError>;

    /// Submit an export job
    async fn start_export(&self, request: &ExportRequest) -> Result<(), RemoteError>;

    /// Read an export job's status
    async fn describe_export(&self, job_id: &str) -> Result<RemoteJobStatus, RemoteError>;

    /// Fetch a finished export's archive bytes
    async fn download_archive(&self, handle: &ArchiveHandle) -> Result<Bytes, RemoteError>;

    /// Cheap reachability check used by pre-flight validation
    async fn check_access(&self) -> Result<(), RemoteError>;
}

/// User and group listing
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// List every user in the namespace
    async fn list_users(&self) -> Result<Vec<User>, RemoteError>;

    /// List every group; `members` is left empty
    async fn list_groups(&self) -> Result<Vec<Group>, RemoteError>;

    /// List one group's member user names
    async fn list_group_members(&self, group_name: &str) -> Result<Vec<String>, RemoteError>;

    /// Cheap reachability check used by pre-flight validation
    async fn check_access(&self) -> Result<(), RemoteError>;
}

/// User-defined object metadata
pub type ObjectMetadata = BTreeMap<String, String>;

/// Result of a metadata read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Stored size in bytes
    pub size: u64,
    /// Entity tag
    pub etag: String,
    /// User-defined metadata
    pub metadata: ObjectMetadata,
}

/// One uploaded part, as listed when completing a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: u32,
    /// Tag returned by the part upload
    pub etag: String,
}

/// Archive storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object in one request, returning its entity tag
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<String, RemoteError>;

    /// Start a multipart upload, returning its upload id
    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, RemoteError>;

    /// Upload one part, returning its entity tag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, RemoteError>;

    /// Assemble the listed parts into the final object
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, RemoteError>;

    /// Discard an unfinished multipart upload and its parts
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), RemoteError>;

    /// Read an object's size, tag and metadata
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, RemoteError>;

    /// Check that the bucket exists and is reachable
    async fn check_access(&self, bucket: &str) -> Result<(), RemoteError>;
}

/// Lifecycle state of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    /// Created, not yet writable
    Creating,
    /// Writable
    Active,
}

/// Definition of a table to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Physical table name
    pub name: String,
    /// String partition key attribute
    pub partition_key: String,
}

/// Identity table storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Status of a table, `None` if it does not exist
    async fn describe_table(&self, table: &str) -> Result<Option<TableStatus>, RemoteError>;

    /// Create an on-demand table with a string hash key
    ///
    /// Creating a table that already exists fails with an error for which
    /// [`RemoteError::is_already_exists`] holds.
    async fn create_table(&self, spec: &TableSpec) -> Result<(), RemoteError>;

    /// Write up to 25 items, returning the items that were not processed
    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<Vec<Item>, RemoteError>;

    /// Check that the store is reachable with the caller's credentials
    async fn check_access(&self) -> Result<(), RemoteError>;
}
