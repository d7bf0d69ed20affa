//! Core types for the backup engine
//!
//! This module defines the fundamental types used throughout the system:
//! - [`RunId`]: Unique identifier for a backup run
//! - [`AssetType`]: The four exportable BI asset kinds
//! - [`AssetRecord`]: One discovered asset, immutable for the rest of the run
//! - [`BackupMode`]: Which halves of the backup a run executes
//! - [`Category`]: The unit of aggregation in the manifest

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a backup run
///
/// Every run gets a fresh id. It is written into the manifest and used as a
/// structured field on every log line emitted while the run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random RunId using UUID v4
    pub fn new() -> Self {
        RunId(Uuid::new_v4())
    }

    /// Create RunId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        RunId(Uuid::from_bytes(bytes))
    }

    /// Get raw bytes representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// First eight hex characters, for compact log output
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The exportable asset kinds, in dependency order
///
/// Datasets read from datasources, analyses and dashboards read from
/// datasets. [`AssetType::ALL`] lists them in that order so that discovery
/// sees a dependency before its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    /// A connection to an upstream data store
    #[serde(rename = "DATASOURCE")]
    DataSource,
    /// A prepared, queryable table built on one or more datasources
    #[serde(rename = "DATASET")]
    DataSet,
    /// An editable analysis built on datasets
    Analysis,
    /// A published dashboard built on datasets
    Dashboard,
}

impl AssetType {
    /// All asset types in dependency order
    pub const ALL: [AssetType; 4] = [
        AssetType::DataSource,
        AssetType::DataSet,
        AssetType::Analysis,
        AssetType::Dashboard,
    ];

    /// Plural lowercase name used in object keys and archive filenames
    pub fn plural(&self) -> &'static str {
        match self {
            AssetType::DataSource => "datasources",
            AssetType::DataSet => "datasets",
            AssetType::Analysis => "analyses",
            AssetType::Dashboard => "dashboards",
        }
    }

    /// Resource segment used in ARNs (`...:dataset/<id>`)
    pub fn arn_resource(&self) -> &'static str {
        match self {
            AssetType::DataSource => "datasource",
            AssetType::DataSet => "dataset",
            AssetType::Analysis => "analysis",
            AssetType::Dashboard => "dashboard",
        }
    }

    /// Canonical uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::DataSource => "DATASOURCE",
            AssetType::DataSet => "DATASET",
            AssetType::Analysis => "ANALYSIS",
            AssetType::Dashboard => "DASHBOARD",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Where an asset's data comes from
///
/// Only datasets carry a meaningful source kind; the other asset types are
/// discovered with [`SourceKind::Unspecified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// Uploaded file. The export capability cannot bundle these.
    File,
    /// Imported into the service's in-memory engine
    Spice,
    /// Queried live against the datasource
    DirectQuery,
    /// Not applicable or not reported
    Unspecified,
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Unspecified
    }
}

/// One discovered asset
///
/// Immutable once discovered within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Service-assigned identifier, unique within its type
    pub id: String,
    /// Full resource name used when requesting an export
    pub arn: String,
    /// Asset kind
    pub asset_type: AssetType,
    /// Display name
    pub name: String,
    /// Ids of the assets this one reads from
    #[serde(default)]
    pub dependency_ids: BTreeSet<String>,
    /// Data origin (datasets only)
    #[serde(default)]
    pub source_kind: SourceKind,
}

impl AssetRecord {
    /// Create a record with no dependencies and an unspecified source kind
    pub fn new(
        asset_type: AssetType,
        id: impl Into<String>,
        arn: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        AssetRecord {
            id: id.into(),
            arn: arn.into(),
            asset_type,
            name: name.into(),
            dependency_ids: BTreeSet::new(),
            source_kind: SourceKind::Unspecified,
        }
    }

    /// Builder-style setter for the source kind
    pub fn with_source_kind(mut self, kind: SourceKind) -> Self {
        self.source_kind = kind;
        self
    }

    /// Builder-style setter for dependencies
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependency_ids = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Which halves of the backup a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupMode {
    /// Identity tables and asset bundles
    Full,
    /// Identity tables only
    UsersOnly,
    /// Asset bundles only
    AssetsOnly,
}

impl BackupMode {
    /// Whether users, groups and memberships are backed up
    pub fn includes_identity(&self) -> bool {
        matches!(self, BackupMode::Full | BackupMode::UsersOnly)
    }

    /// Whether asset bundles are exported
    pub fn includes_assets(&self) -> bool {
        matches!(self, BackupMode::Full | BackupMode::AssetsOnly)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupMode::Full => "full",
            BackupMode::UsersOnly => "users-only",
            BackupMode::AssetsOnly => "assets-only",
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(BackupMode::Full),
            "users-only" => Ok(BackupMode::UsersOnly),
            "assets-only" => Ok(BackupMode::AssetsOnly),
            other => Err(format!(
                "unknown backup mode '{}': expected full, users-only or assets-only",
                other
            )),
        }
    }
}

/// A resource category in the manifest
///
/// Ordering is the manifest's presentation order: identity first, then the
/// asset types in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Users table
    Users,
    /// Groups table
    Groups,
    /// User/group membership table
    Memberships,
    /// Datasource bundles
    #[serde(rename = "datasources")]
    DataSources,
    /// Dataset bundles
    #[serde(rename = "datasets")]
    DataSets,
    /// Analysis bundles
    Analyses,
    /// Dashboard bundles
    Dashboards,
}

impl Category {
    /// Identity categories in write order
    pub const IDENTITY: [Category; 3] = [Category::Users, Category::Groups, Category::Memberships];

    /// Lowercase name as it appears in the manifest
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Users => "users",
            Category::Groups => "groups",
            Category::Memberships => "memberships",
            Category::DataSources => "datasources",
            Category::DataSets => "datasets",
            Category::Analyses => "analyses",
            Category::Dashboards => "dashboards",
        }
    }

    /// Whether this category holds identity records rather than bundles
    pub fn is_identity(&self) -> bool {
        matches!(self, Category::Users | Category::Groups | Category::Memberships)
    }
}

impl From<AssetType> for Category {
    fn from(asset_type: AssetType) -> Self {
        match asset_type {
            AssetType::DataSource => Category::DataSources,
            AssetType::DataSet => Category::DataSets,
            AssetType::Analysis => Category::Analyses,
            AssetType::Dashboard => Category::Dashboards,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
