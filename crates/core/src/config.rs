//! Run configuration
//!
//! A [`BackupConfig`] is the fully resolved configuration a run consumes.
//! Loading it from a file is the embedding binary's job; this module only
//! owns the shape, the defaults, the validation rules and the fingerprint
//! recorded in the manifest.
//!
//! Durations serialize as integer milliseconds under a `_millis` suffix.
//!
//! ```
//! use qsbackup_core::config::BackupConfig;
//!
//! let config = BackupConfig::builder()
//!     .account_id("123456789012")
//!     .bucket("bi-backups")
//!     .max_assets_per_bundle(25)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.export.max_assets_per_bundle, 25);
//! ```

use crate::error::ConfigError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::collections::HashSet;
use std::time::Duration;

/// Smallest allowed bundle size
pub const MIN_ASSETS_PER_BUNDLE: usize = 1;
/// Largest bundle the export capability accepts
pub const MAX_ASSETS_PER_BUNDLE: usize = 100;
/// Largest identity write batch the document store accepts
pub const MAX_BATCH_SIZE: usize = 25;
/// Largest number of parts in one multipart upload
pub const MAX_UPLOAD_PARTS: u64 = 10_000;

const MIB: u64 = 1024 * 1024;

/// Length of the `YYYY-MM-DD-` prefix added to identity table names
const DATED_PREFIX_LEN: usize = 11;
const MAX_TABLE_NAME_LEN: usize = 255;

/// Complete configuration for one backup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackupConfig {
    /// Account and region addressing
    pub aws: AwsConfig,
    /// Base names of the identity tables
    pub tables: TableNames,
    /// Object storage destination
    pub storage: StorageConfig,
    /// Options passed to every export job
    pub export: ExportOptions,
    /// Worker pool sizing
    pub concurrency: ConcurrencyConfig,
    /// Call, poll and run deadlines
    pub timeouts: TimeoutConfig,
    /// Retry budget shared by every retrying unit
    pub retry: RetryConfig,
    /// Archive upload tuning
    pub upload: UploadConfig,
    /// Identity write tuning
    pub identity: IdentityConfig,
}

/// Account and region addressing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Region hosting the BI assets, tables and bucket
    pub region: String,
    /// Region hosting users and groups, when it differs from `region`
    pub identity_region: Option<String>,
    /// Twelve-digit account id
    pub account_id: String,
    /// Identity namespace
    pub namespace: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        AwsConfig {
            region: "us-east-1".to_string(),
            identity_region: None,
            account_id: String::new(),
            namespace: "default".to_string(),
        }
    }
}

impl AwsConfig {
    /// Region used for identity listings
    pub fn identity_region(&self) -> &str {
        self.identity_region.as_deref().unwrap_or(&self.region)
    }
}

/// Base names of the three identity tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    /// Users table base name
    pub users: String,
    /// Groups table base name
    pub groups: String,
    /// Membership table base name
    pub memberships: String,
}

impl Default for TableNames {
    fn default() -> Self {
        TableNames {
            users: "quicksight-users-backup".to_string(),
            groups: "quicksight-groups-backup".to_string(),
            memberships: "quicksight-users-groups-backup".to_string(),
        }
    }
}

/// Date segment layout inside object keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PrefixFormat {
    /// `2024/03/07`
    #[default]
    #[serde(rename = "YYYY/MM/DD")]
    Slashed,
    /// `2024-03-07`
    #[serde(rename = "YYYY-MM-DD")]
    Dashed,
    /// `20240307`
    #[serde(rename = "YYYYMMDD")]
    Compact,
}

impl PrefixFormat {
    /// Render a date in this layout
    pub fn format_date(&self, date: NaiveDate) -> String {
        let pattern = match self {
            PrefixFormat::Slashed => "%Y/%m/%d",
            PrefixFormat::Dashed => "%Y-%m-%d",
            PrefixFormat::Compact => "%Y%m%d",
        };
        date.format(pattern).to_string()
    }
}

/// Object storage destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket receiving the archives
    pub bucket: String,
    /// Key prefix, without leading or trailing slash
    pub prefix: String,
    /// Date segment layout
    pub prefix_format: PrefixFormat,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            bucket: String::new(),
            prefix: "quicksight-backups".to_string(),
            prefix_format: PrefixFormat::Slashed,
        }
    }
}

/// Archive format requested from the export capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportFormat {
    /// Native bundle format
    #[default]
    QuicksightJson,
    /// Infrastructure-template format
    CloudformationJson,
}

/// Options passed to every export job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Include the assets each exported asset depends on
    pub include_dependencies: bool,
    /// Include permission grants
    pub include_permissions: bool,
    /// Include resource tags
    pub include_tags: bool,
    /// Archive format
    pub export_format: ExportFormat,
    /// Assets per export bundle, `1..=100`
    pub max_assets_per_bundle: usize,
    /// Exclude assets whose dependencies were excluded
    pub cascade_exclusions: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            include_dependencies: true,
            include_permissions: true,
            include_tags: true,
            export_format: ExportFormat::QuicksightJson,
            max_assets_per_bundle: 50,
            cascade_exclusions: false,
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Units executing at once across bundles and identity categories
    pub workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        ConcurrencyConfig { workers: 4 }
    }
}

/// Deadlines at call, job and run level
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single remote call
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "call_timeout_millis")]
    pub call_timeout: Duration,
    /// Sleep between export status polls
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "poll_interval_millis")]
    pub poll_interval: Duration,
    /// Longest an export job may stay unfinished before the attempt fails
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "max_poll_wait_millis")]
    pub max_poll_wait: Duration,
    /// Optional wall-clock budget for the whole run
    #[serde_as(as = "Option<DurationMilliSeconds>")]
    #[serde(rename = "run_timeout_millis")]
    pub run_timeout: Option<Duration>,
    /// Sleep between table status checks
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "table_poll_interval_millis")]
    pub table_poll_interval: Duration,
    /// Longest a new table may take to become writable
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "table_ready_timeout_millis")]
    pub table_ready_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            call_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
            max_poll_wait: Duration::from_secs(1200),
            run_timeout: None,
            table_poll_interval: Duration::from_secs(2),
            table_ready_timeout: Duration::from_secs(300),
        }
    }
}

/// Retry budget: attempts and exponential backoff shape
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "base_delay_millis")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "max_delay_millis")]
    pub max_delay: Duration,
    /// Relative jitter applied to each delay, in `[0, 1)`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

/// Archive upload tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Archives larger than this many bytes use multipart upload
    pub multipart_threshold: u64,
    /// Bytes per multipart part
    pub part_size: u64,
    /// Parts uploaded concurrently within one archive
    pub part_concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            multipart_threshold: 100 * MIB,
            part_size: 16 * MIB,
            part_concurrency: 4,
        }
    }
}

impl UploadConfig {
    /// Number of parts an archive of `len` bytes is split into
    pub fn part_count(&self, len: u64) -> u64 {
        if len == 0 {
            1
        } else {
            (len + self.part_size - 1) / self.part_size
        }
    }
}

/// Identity write tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Records per batch write, `1..=25`
    pub batch_size: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl BackupConfig {
    /// Start building a configuration from defaults
    pub fn builder() -> BackupConfigBuilder {
        BackupConfigBuilder::new()
    }

    /// Check every rule and report all violations at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        check_region("aws.region", &self.aws.region, &mut errors);
        if let Some(region) = &self.aws.identity_region {
            check_region("aws.identity_region", region, &mut errors);
        }
        if self.aws.account_id.len() != 12 || !self.aws.account_id.chars().all(|c| c.is_ascii_digit()) {
            errors.push(format!(
                "aws.account_id must be exactly 12 digits, got '{}'",
                self.aws.account_id
            ));
        }
        if self.aws.namespace.is_empty() {
            errors.push("aws.namespace must not be empty".to_string());
        }

        let tables = [
            ("tables.users", &self.tables.users),
            ("tables.groups", &self.tables.groups),
            ("tables.memberships", &self.tables.memberships),
        ];
        for (field, name) in tables {
            check_table_name(field, name, &mut errors);
        }
        let distinct: HashSet<&str> = tables.iter().map(|(_, n)| n.as_str()).collect();
        if distinct.len() != tables.len() {
            errors.push("tables.users, tables.groups and tables.memberships must be distinct".to_string());
        }

        check_bucket(&self.storage.bucket, &mut errors);
        check_prefix(&self.storage.prefix, &mut errors);

        let bundle = self.export.max_assets_per_bundle;
        if !(MIN_ASSETS_PER_BUNDLE..=MAX_ASSETS_PER_BUNDLE).contains(&bundle) {
            errors.push(format!(
                "export.max_assets_per_bundle must be in [{}, {}], got {}",
                MIN_ASSETS_PER_BUNDLE, MAX_ASSETS_PER_BUNDLE, bundle
            ));
        }

        if self.concurrency.workers == 0 {
            errors.push("concurrency.workers must be at least 1".to_string());
        }

        let t = &self.timeouts;
        for (field, value) in [
            ("timeouts.call_timeout", t.call_timeout),
            ("timeouts.poll_interval", t.poll_interval),
            ("timeouts.max_poll_wait", t.max_poll_wait),
            ("timeouts.table_poll_interval", t.table_poll_interval),
            ("timeouts.table_ready_timeout", t.table_ready_timeout),
        ] {
            if value.is_zero() {
                errors.push(format!("{} must be non-zero", field));
            }
        }
        if matches!(t.run_timeout, Some(d) if d.is_zero()) {
            errors.push("timeouts.run_timeout must be non-zero when set".to_string());
        }

        let r = &self.retry;
        if r.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }
        if r.max_delay < r.base_delay {
            errors.push("retry.max_delay must not be below retry.base_delay".to_string());
        }
        if !(0.0..1.0).contains(&r.jitter) {
            errors.push(format!("retry.jitter must be in [0, 1), got {}", r.jitter));
        }

        let u = &self.upload;
        if u.part_size == 0 {
            errors.push("upload.part_size must be non-zero".to_string());
        } else if u.multipart_threshold < u.part_size {
            errors.push("upload.multipart_threshold must not be below upload.part_size".to_string());
        }
        if u.part_concurrency == 0 {
            errors.push("upload.part_concurrency must be at least 1".to_string());
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.identity.batch_size) {
            errors.push(format!(
                "identity.batch_size must be in [1, {}], got {}",
                MAX_BATCH_SIZE, self.identity.batch_size
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { errors })
        }
    }

    /// Stable hash of the configuration, recorded in the manifest
    ///
    /// Two runs with equal configurations produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        format!("{:016x}", xxhash_rust::xxh3::xxh3_64(&canonical))
    }
}

fn check_region(field: &str, region: &str, errors: &mut Vec<String>) {
    let ok = !region.is_empty()
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !ok {
        errors.push(format!("{} '{}' is not a valid region name", field, region));
    }
}

fn check_table_name(field: &str, name: &str, errors: &mut Vec<String>) {
    let max = MAX_TABLE_NAME_LEN - DATED_PREFIX_LEN;
    if name.len() < 3 || name.len() > max {
        errors.push(format!("{} must be 3 to {} characters, got {}", field, max, name.len()));
        return;
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !(first_ok && rest_ok) {
        errors.push(format!("{} '{}' contains invalid characters", field, name));
    }
}

fn check_bucket(bucket: &str, errors: &mut Vec<String>) {
    if bucket.len() < 3 || bucket.len() > 63 {
        errors.push(format!(
            "storage.bucket must be 3 to 63 characters, got '{}'",
            bucket
        ));
        return;
    }
    let bytes = bucket.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let body_ok = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    if !body_ok || !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        errors.push(format!("storage.bucket '{}' contains invalid characters", bucket));
    }
    if ["..", "--", ".-", "-."].iter().any(|p| bucket.contains(p)) {
        errors.push(format!("storage.bucket '{}' has adjacent separators", bucket));
    }
    if bucket.parse::<std::net::Ipv4Addr>().is_ok() {
        errors.push(format!("storage.bucket '{}' must not look like an IP address", bucket));
    }
}

fn check_prefix(prefix: &str, errors: &mut Vec<String>) {
    if prefix.is_empty() {
        errors.push("storage.prefix must not be empty".to_string());
        return;
    }
    if prefix.starts_with('/') || prefix.ends_with('/') {
        errors.push("storage.prefix must not start or end with '/'".to_string());
    }
    if prefix.contains("//") {
        errors.push("storage.prefix must not contain '//'".to_string());
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'))
    {
        errors.push(format!("storage.prefix '{}' contains invalid characters", prefix));
    }
}

/// Builder for [`BackupConfig`]
///
/// Starts from defaults; [`build`](Self::build) validates.
#[derive(Debug, Clone, Default)]
pub struct BackupConfigBuilder {
    config: BackupConfig,
}

impl BackupConfigBuilder {
    /// Create a builder seeded with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the asset region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.aws.region = region.into();
        self
    }

    /// Set a separate identity region
    pub fn identity_region(mut self, region: impl Into<String>) -> Self {
        self.config.aws.identity_region = Some(region.into());
        self
    }

    /// Set the account id
    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.config.aws.account_id = account_id.into();
        self
    }

    /// Set the identity namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.aws.namespace = namespace.into();
        self
    }

    /// Set the three identity table base names
    pub fn tables(
        mut self,
        users: impl Into<String>,
        groups: impl Into<String>,
        memberships: impl Into<String>,
    ) -> Self {
        self.config.tables = TableNames {
            users: users.into(),
            groups: groups.into(),
            memberships: memberships.into(),
        };
        self
    }

    /// Set the destination bucket
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = bucket.into();
        self
    }

    /// Set the key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.storage.prefix = prefix.into();
        self
    }

    /// Set the date segment layout
    pub fn prefix_format(mut self, format: PrefixFormat) -> Self {
        self.config.storage.prefix_format = format;
        self
    }

    /// Set the bundle size
    pub fn max_assets_per_bundle(mut self, max: usize) -> Self {
        self.config.export.max_assets_per_bundle = max;
        self
    }

    /// Enable or disable cascade exclusions
    pub fn cascade_exclusions(mut self, enabled: bool) -> Self {
        self.config.export.cascade_exclusions = enabled;
        self
    }

    /// Replace all export options
    pub fn export(mut self, export: ExportOptions) -> Self {
        self.config.export = export;
        self
    }

    /// Set the worker pool size
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.concurrency.workers = workers;
        self
    }

    /// Replace all timeouts
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Set the run budget
    pub fn run_timeout(mut self, budget: Duration) -> Self {
        self.config.timeouts.run_timeout = Some(budget);
        self
    }

    /// Replace the retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Replace upload tuning
    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.config.upload = upload;
        self
    }

    /// Set the identity batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.identity.batch_size = batch_size;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<BackupConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without validating it
    pub fn build_unchecked(self) -> BackupConfig {
        self.config
    }
}
