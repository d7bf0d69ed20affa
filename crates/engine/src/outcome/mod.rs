//! Run outcomes: the aggregator units report into, and the report it builds

pub mod aggregator;
pub mod report;

pub use aggregator::{IdentityOutcome, OutcomeAggregator};
pub use report::{
    BackupReport, CategoryResult, CategoryStatus, ErrorEntry, ExclusionEntry, Note, RunMetadata,
    RunStatistics,
};
