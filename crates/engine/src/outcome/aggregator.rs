//! Outcome aggregator
//!
//! The one piece of shared mutable state in a run. Units report events as
//! they finish, in any order; each event is applied under a single lock.
//! The aggregator never retries and never calls a remote service.

use crate::outcome::report::{
    BackupReport, CategoryResult, ErrorEntry, ExclusionEntry, Note, RunMetadata,
};
use parking_lot::Mutex;
use qsbackup_core::{Category, ErrorKind};
use qsbackup_primitives::Exclusion;
use std::collections::BTreeMap;

/// Final counts of one identity category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityOutcome {
    /// Which category
    pub category: Category,
    /// Dated table name
    pub table: String,
    /// Records attempted
    pub attempted: usize,
    /// Records written
    pub succeeded: usize,
    /// Records not written
    pub failed: usize,
    /// Failure details
    pub errors: Vec<ErrorEntry>,
}

/// Thread-safe accumulator of unit outcomes
#[derive(Debug, Default)]
pub struct OutcomeAggregator {
    categories: Mutex<BTreeMap<Category, CategoryResult>>,
}

impl OutcomeAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, category: Category, f: impl FnOnce(&mut CategoryResult) -> R) -> R {
        let mut categories = self.categories.lock();
        let entry = categories
            .entry(category)
            .or_insert_with(|| CategoryResult::new(category));
        f(entry)
    }

    /// Discovery finished and `units` bundles or records were scheduled
    pub fn record_planned(&self, category: Category, units: usize) {
        self.with(category, |c| c.planned += units);
    }

    /// A bundle archive was published under `key`
    pub fn record_bundle_success(&self, category: Category, key: String) {
        self.with(category, |c| {
            c.attempted += 1;
            c.succeeded += 1;
            c.archive_keys.push(key);
        });
    }

    /// A bundle ended without a published archive
    pub fn record_bundle_failure(&self, category: Category, error: ErrorEntry) {
        self.with(category, |c| {
            c.attempted += 1;
            c.failed += 1;
            c.errors.push(error);
        });
    }

    /// An identity category finished writing
    pub fn record_identity(&self, outcome: IdentityOutcome) {
        self.with(outcome.category, |c| {
            c.attempted += outcome.attempted;
            c.succeeded += outcome.succeeded;
            c.failed += outcome.failed;
            c.errors.extend(outcome.errors);
            c.table = Some(outcome.table);
        });
    }

    /// An asset was excluded by the catalog filter
    pub fn record_exclusion(&self, category: Category, exclusion: &Exclusion) {
        self.with(category, |c| {
            c.exclusions.push(ExclusionEntry {
                resource_ref: exclusion.asset.id.clone(),
                name: exclusion.asset.name.clone(),
                reason: exclusion.reason,
            });
        });
    }

    /// Attach an informational note
    pub fn record_note(&self, category: Category, note: Note) {
        self.with(category, |c| {
            if !c.notes.contains(&note) {
                c.notes.push(note);
            }
        });
    }

    /// A failure that is not tied to an attempted unit, such as a listing
    pub fn record_error(&self, category: Category, kind: ErrorKind, resource_ref: &str, message: String) {
        self.with(category, |c| {
            c.errors.push(ErrorEntry::new(resource_ref, kind, message));
        });
    }

    /// Snapshot of one category so far
    pub fn snapshot(&self, category: Category) -> Option<CategoryResult> {
        self.categories.lock().get(&category).cloned()
    }

    /// Close the run and build the report
    ///
    /// Archive keys are sorted so the manifest does not depend on
    /// completion order. Events recorded afterwards start a fresh manifest.
    pub fn finalize(&self, metadata: RunMetadata) -> BackupReport {
        let mut categories = std::mem::take(&mut *self.categories.lock());
        for c in categories.values_mut() {
            c.archive_keys.sort();
            c.status = c.derive_status();
        }
        BackupReport::new(metadata, categories)
    }
}
