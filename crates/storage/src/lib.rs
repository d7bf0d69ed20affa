//! Storage seams for qsbackup
//!
//! This crate defines the remote capabilities the engine depends on and
//! ships in-memory implementations of each:
//! - AssetExportService / MemoryExportService
//! - IdentityDirectory / MemoryDirectory
//! - ObjectStore / MemoryObjectStore
//! - DocumentStore / MemoryDocumentStore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod traits;

pub use memory::{
    FaultScript, MemoryDirectory, MemoryDocumentStore, MemoryExportService, MemoryObjectStore,
};
pub use traits::{
    ArchiveHandle, AssetExportService, CompletedPart, DocumentStore, ExportRequest,
    IdentityDirectory, ObjectHead, ObjectMetadata, ObjectStore, RemoteJobStatus, TableSpec,
    TableStatus,
};
