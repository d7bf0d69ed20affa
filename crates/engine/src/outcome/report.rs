//! Manifest and report model
//!
//! A [`BackupReport`] is the immutable result of one run. It serializes to
//! the JSON manifest and renders as the plain-text report; both carry the
//! same data.
//!
//! Per category, `attempted == succeeded + failed` always holds, and for
//! asset categories `archive_keys` has exactly one key per succeeded
//! bundle. Exclusions and notes are informational and never count as
//! failures.

use chrono::{DateTime, Utc};
use qsbackup_core::identity::iso8601;
use qsbackup_core::{BackupError, BackupMode, Category, ErrorKind, RunId};
use qsbackup_primitives::ExclusionReason;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Informational outcome that is neither success nor failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Note {
    /// Discovery returned nothing to back up
    NoAssets,
    /// Every discovered asset was excluded by policy
    AllExcluded,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::NoAssets => f.write_str("NO_ASSETS"),
            Note::AllExcluded => f.write_str("ALL_EXCLUDED"),
        }
    }
}

/// A failed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    /// Bundle reference, table name, or record key
    pub resource_ref: String,
    /// Failure kind
    pub error_kind: ErrorKind,
    /// Last error message
    pub message: String,
}

impl ErrorEntry {
    /// Create an entry
    pub fn new(resource_ref: impl Into<String>, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        ErrorEntry {
            resource_ref: resource_ref.into(),
            error_kind,
            message: message.into(),
        }
    }
}

/// An asset left out by the catalog filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionEntry {
    /// Asset id
    pub resource_ref: String,
    /// Asset display name
    pub name: String,
    /// Why it was excluded
    pub reason: ExclusionReason,
}

/// Overall verdict for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryStatus {
    /// Nothing was discovered
    NoAssets,
    /// Everything discovered was excluded by policy
    Excluded,
    /// Every attempted unit succeeded
    Success,
    /// Some units succeeded and some failed
    Partial,
    /// Nothing succeeded and something failed
    Failed,
    /// Units were planned but the run stopped before any of them finished
    Incomplete,
}

impl fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CategoryStatus::NoAssets => "NO_ASSETS",
            CategoryStatus::Excluded => "EXCLUDED",
            CategoryStatus::Success => "SUCCESS",
            CategoryStatus::Partial => "PARTIAL",
            CategoryStatus::Failed => "FAILED",
            CategoryStatus::Incomplete => "INCOMPLETE",
        };
        f.write_str(s)
    }
}

/// Accumulated outcome of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryResult {
    /// Which category
    pub category: Category,
    /// Bundles (assets) or records (identity) scheduled after discovery
    pub planned: usize,
    /// Bundles (assets) or records (identity) attempted
    pub attempted: usize,
    /// Units that succeeded
    pub succeeded: usize,
    /// Units that failed
    pub failed: usize,
    /// Object keys of published archives
    pub archive_keys: Vec<String>,
    /// Failure details
    pub errors: Vec<ErrorEntry>,
    /// Assets excluded by policy
    pub exclusions: Vec<ExclusionEntry>,
    /// Informational notes
    pub notes: Vec<Note>,
    /// Dated table name, for identity categories that reached one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Verdict
    pub status: CategoryStatus,
}

impl CategoryResult {
    /// An empty result for `category`
    pub fn new(category: Category) -> Self {
        CategoryResult {
            category,
            planned: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            archive_keys: Vec::new(),
            errors: Vec::new(),
            exclusions: Vec::new(),
            notes: Vec::new(),
            table: None,
            status: CategoryStatus::NoAssets,
        }
    }

    /// Derive the verdict from the counts
    pub fn derive_status(&self) -> CategoryStatus {
        match (self.succeeded, self.failed) {
            (s, 0) if s > 0 => CategoryStatus::Success,
            (s, f) if s > 0 && f > 0 => CategoryStatus::Partial,
            (_, f) if f > 0 => CategoryStatus::Failed,
            _ if !self.errors.is_empty() => CategoryStatus::Failed,
            _ if self.planned > 0 => CategoryStatus::Incomplete,
            _ if !self.exclusions.is_empty() => CategoryStatus::Excluded,
            _ => CategoryStatus::NoAssets,
        }
    }
}

/// Run-level identification and timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    /// Run id
    pub run_id: RunId,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the manifest was finalized
    pub finished_at: DateTime<Utc>,
    /// Mode the run executed
    pub mode: BackupMode,
    /// Fingerprint of the resolved configuration
    pub config_fingerprint: String,
    /// Whether the run was cancelled or hit its time budget
    pub cancelled: bool,
    /// Account the run backed up
    pub account_id: String,
    /// Region of the asset service
    pub region: String,
    /// Version of the tool that produced the manifest
    pub tool_version: String,
}

/// Totals across categories
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Units attempted
    pub total_attempted: usize,
    /// Units succeeded
    pub total_succeeded: usize,
    /// Units failed
    pub total_failed: usize,
    /// Assets excluded by policy
    pub total_excluded: usize,
    /// Archives published
    pub total_archives: usize,
    /// `succeeded / attempted * 100`, or 0 when nothing was attempted
    pub success_rate: f64,
}

impl RunStatistics {
    /// Sum the categories
    pub fn from_categories<'a>(categories: impl IntoIterator<Item = &'a CategoryResult>) -> Self {
        let mut stats = RunStatistics {
            total_attempted: 0,
            total_succeeded: 0,
            total_failed: 0,
            total_excluded: 0,
            total_archives: 0,
            success_rate: 0.0,
        };
        for c in categories {
            stats.total_attempted += c.attempted;
            stats.total_succeeded += c.succeeded;
            stats.total_failed += c.failed;
            stats.total_excluded += c.exclusions.len();
            stats.total_archives += c.archive_keys.len();
        }
        if stats.total_attempted > 0 {
            stats.success_rate = stats.total_succeeded as f64 / stats.total_attempted as f64 * 100.0;
        }
        stats
    }
}

/// The result of one run
///
/// # Example
///
/// ```ignore
/// let report = engine.run(&config, BackupMode::Full).await?;
/// report.write_manifest("out/manifest.json")?;
/// println!("{}", report);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupReport {
    /// Run metadata
    pub metadata: RunMetadata,
    /// Per-category results, in presentation order
    pub categories: BTreeMap<Category, CategoryResult>,
    /// Totals
    pub statistics: RunStatistics,
}

impl BackupReport {
    /// Assemble a report; statistics are derived from `categories`
    pub fn new(metadata: RunMetadata, categories: BTreeMap<Category, CategoryResult>) -> Self {
        let statistics = RunStatistics::from_categories(categories.values());
        BackupReport {
            metadata,
            categories,
            statistics,
        }
    }

    /// Result for one category, if the run covered it
    pub fn category(&self, category: Category) -> Option<&CategoryResult> {
        self.categories.get(&category)
    }

    /// Whether any category recorded a failure
    pub fn has_failures(&self) -> bool {
        self.categories
            .values()
            .any(|c| c.failed > 0 || !c.errors.is_empty())
    }

    /// Every published archive key, in category order
    pub fn archive_keys(&self) -> Vec<&str> {
        self.categories
            .values()
            .flat_map(|c| c.archive_keys.iter().map(String::as_str))
            .collect()
    }

    /// Manifest as pretty-printed JSON
    pub fn manifest_json(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON manifest, creating parent directories
    pub fn write_manifest(&self, path: impl AsRef<Path>) -> Result<(), BackupError> {
        let json = self.manifest_json()?;
        write_creating_dirs(path.as_ref(), json.as_bytes())
    }

    /// Write the text report, creating parent directories
    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<(), BackupError> {
        write_creating_dirs(path.as_ref(), self.to_string().as_bytes())
    }
}

fn write_creating_dirs(path: &Path, contents: &[u8]) -> Result<(), BackupError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| BackupError::Internal(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    fs::write(path, contents).map_err(|e| BackupError::Internal(format!("cannot write {}: {}", path.display(), e)))
}

impl fmt::Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metadata;
        writeln!(f, "Backup report")?;
        writeln!(f, "=============")?;
        writeln!(f, "run id:       {}", m.run_id)?;
        writeln!(f, "mode:         {}", m.mode)?;
        writeln!(f, "account:      {}", m.account_id)?;
        writeln!(f, "region:       {}", m.region)?;
        writeln!(f, "started:      {}", iso8601(m.started_at))?;
        writeln!(f, "finished:     {}", iso8601(m.finished_at))?;
        writeln!(f, "config:       {}", m.config_fingerprint)?;
        if m.cancelled {
            writeln!(f, "cancelled:    yes (partial results)")?;
        }
        writeln!(f)?;

        for c in self.categories.values() {
            writeln!(
                f,
                "{:<12} {:<10} planned={} attempted={} succeeded={} failed={} excluded={}",
                c.category.as_str(),
                c.status.to_string(),
                c.planned,
                c.attempted,
                c.succeeded,
                c.failed,
                c.exclusions.len()
            )?;
            if let Some(table) = &c.table {
                writeln!(f, "  table: {}", table)?;
            }
            for note in &c.notes {
                writeln!(f, "  note: {}", note)?;
            }
            for key in &c.archive_keys {
                writeln!(f, "  archive: {}", key)?;
            }
            for x in &c.exclusions {
                writeln!(f, "  excluded: {} ({}) {}", x.resource_ref, x.name, x.reason)?;
            }
            for e in &c.errors {
                writeln!(f, "  error: {} {}: {}", e.resource_ref, e.error_kind, e.message)?;
            }
        }

        let s = &self.statistics;
        writeln!(f)?;
        writeln!(
            f,
            "total: attempted={} succeeded={} failed={} excluded={} archives={} success_rate={:.1}%",
            s.total_attempted, s.total_succeeded, s.total_failed, s.total_excluded, s.total_archives, s.success_rate
        )
    }
}
