//! Planning primitives for qsbackup
//!
//! Pure, side-effect free building blocks the engine composes:
//! - CatalogFilter: eligible vs excluded assets
//! - BundlePlanner: size-bounded, index-stable bundles
//! - keys: object keys, archive filenames, export job ids

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bundle;
pub mod catalog;
pub mod keys;

pub use bundle::{Bundle, BundlePlan, BundlePlanner};
pub use catalog::{filter_assets, CatalogFilter, Exclusion, ExclusionReason, FilterOutcome};
pub use keys::{archive_filename, export_job_id, object_key};
