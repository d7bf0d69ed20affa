//! In-memory service implementations
//!
//! Each service keeps its state in concurrent maps so the engine can drive
//! it from many units at once, and exposes [`FaultScript`] fields and a few
//! knobs for injecting failures, delays and partial results.

pub mod directory;
pub mod document;
pub mod export;
pub mod faults;
pub mod object;

pub use directory::MemoryDirectory;
pub use document::MemoryDocumentStore;
pub use export::MemoryExportService;
pub use faults::FaultScript;
pub use object::MemoryObjectStore;
