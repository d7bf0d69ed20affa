//! Shared fixtures for the integration suites
//!
//! Every test runs the engine against the in-memory services with a pinned
//! clock and millisecond-scale timings.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use qsbackup::storage::{MemoryDirectory, MemoryDocumentStore, MemoryExportService, MemoryObjectStore};
use qsbackup::{
    AssetRecord, AssetType, BackupConfig, BackupEngine, BackupReport, CategoryResult, Group,
    ServiceClients, SourceKind, User,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use qsbackup::{BackupMode, Category, CategoryStatus, ErrorKind, RemoteError};

pub const BUCKET: &str = "bi-backups";
pub const ACCOUNT: &str = "123456789012";

/// 2024-03-07T14:30:05Z
pub fn run_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 5).unwrap()
}

/// Date-partitioned key prefix for the pinned run date
pub fn key_prefix(plural: &str) -> String {
    format!("quicksight-backups/2024/03/07/{}/", plural)
}

/// Dated table name for the pinned run date
pub fn dated(base: &str) -> String {
    format!("2024-03-07-{}", base)
}

pub const USERS_TABLE: &str = "quicksight-users-backup";
pub const GROUPS_TABLE: &str = "quicksight-groups-backup";
pub const MEMBERSHIPS_TABLE: &str = "quicksight-users-groups-backup";

/// A valid configuration with fast polling and short backoff
pub fn test_config() -> BackupConfig {
    let mut config = BackupConfig::builder()
        .account_id(ACCOUNT)
        .bucket(BUCKET)
        .build()
        .unwrap();
    config.timeouts.call_timeout = Duration::from_secs(2);
    config.timeouts.poll_interval = Duration::from_millis(1);
    config.timeouts.max_poll_wait = Duration::from_secs(2);
    config.timeouts.table_poll_interval = Duration::from_millis(1);
    config.timeouts.table_ready_timeout = Duration::from_secs(1);
    config.retry.base_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config
}

/// Clock returning each instant once, then the last one forever
pub struct SteppingClock {
    instants: Mutex<VecDeque<DateTime<Utc>>>,
}

impl SteppingClock {
    pub fn new(instants: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        SteppingClock { instants: Mutex::new(instants.into_iter().collect()) }
    }
}

impl qsbackup::Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut instants = self.instants.lock().unwrap();
        if instants.len() > 1 {
            instants.pop_front().unwrap()
        } else {
            *instants.front().unwrap()
        }
    }
}

/// Runs just before midnight; every later reading is 2024-03-08T00:00:30Z
pub fn midnight_clock() -> SteppingClock {
    SteppingClock::new([
        Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 30).unwrap(),
    ])
}

/// The four in-memory services behind one engine
pub struct TestEnv {
    pub exports: Arc<MemoryExportService>,
    pub directory: Arc<MemoryDirectory>,
    pub objects: Arc<MemoryObjectStore>,
    pub documents: Arc<MemoryDocumentStore>,
}

impl TestEnv {
    pub fn new() -> Self {
        TestEnv {
            exports: Arc::new(MemoryExportService::new()),
            directory: Arc::new(MemoryDirectory::new()),
            objects: Arc::new(MemoryObjectStore::with_bucket(BUCKET)),
            documents: Arc::new(MemoryDocumentStore::new()),
        }
    }

    pub fn clients(&self) -> ServiceClients {
        ServiceClients {
            exports: self.exports.clone(),
            directory: self.directory.clone(),
            objects: self.objects.clone(),
            documents: self.documents.clone(),
        }
    }

    /// Engine with the clock pinned to [`run_instant`]
    pub fn engine(&self) -> BackupEngine {
        self.engine_at(run_instant())
    }

    pub fn engine_at(&self, now: DateTime<Utc>) -> BackupEngine {
        BackupEngine::new(self.clients()).with_clock(Arc::new(qsbackup::FixedClock(now)))
    }

    pub fn engine_with_clock(&self, clock: SteppingClock) -> BackupEngine {
        BackupEngine::new(self.clients()).with_clock(Arc::new(clock))
    }

    pub async fn run(&self, mode: BackupMode) -> BackupReport {
        self.engine().run(&test_config(), mode).await.unwrap()
    }

    /// `n` users named `user000..`
    pub fn add_users(&self, n: usize) {
        for i in 0..n {
            let mut user = User::new(format!("user{:03}", i), format!("arn:aws:quicksight:us-east-1:{}:user/default/user{:03}", ACCOUNT, i));
            user.email = Some(format!("user{:03}@example.com", i));
            user.role = Some("READER".to_string());
            self.directory.add_user(user);
        }
    }

    pub fn add_group(&self, name: &str, members: &[&str]) {
        let mut group = Group::new(name, format!("arn:aws:quicksight:us-east-1:{}:group/default/{}", ACCOUNT, name));
        group.members = members.iter().map(|m| m.to_string()).collect();
        self.directory.add_group(group);
    }

    /// `n` assets of one type named `{plural}-000..`
    pub fn add_assets(&self, asset_type: AssetType, n: usize) {
        for i in 0..n {
            self.exports.add_asset(asset(asset_type, &format!("{}-{:03}", asset_type.plural(), i)));
        }
    }
}

pub fn asset(asset_type: AssetType, id: &str) -> AssetRecord {
    AssetRecord::new(
        asset_type,
        id,
        format!("arn:aws:quicksight:us-east-1:{}:{}/{}", ACCOUNT, asset_type.arn_resource(), id),
        format!("{} name", id),
    )
}

pub fn file_dataset(id: &str) -> AssetRecord {
    asset(AssetType::DataSet, id).with_source_kind(SourceKind::File)
}

pub fn spice_dataset(id: &str) -> AssetRecord {
    asset(AssetType::DataSet, id).with_source_kind(SourceKind::Spice)
}

pub fn category(report: &BackupReport, category: Category) -> &CategoryResult {
    report
        .category(category)
        .unwrap_or_else(|| panic!("no {} in report", category))
}

/// Counts balance and archive keys match succeeded bundles, per category
pub fn assert_manifest_invariants(report: &BackupReport) {
    for c in report.categories.values() {
        assert_eq!(c.attempted, c.succeeded + c.failed, "{} counts", c.category);
        assert!(c.planned >= c.attempted, "{} planned", c.category);
        if c.category.is_identity() {
            assert!(c.archive_keys.is_empty(), "{} has archives", c.category);
        } else {
            assert_eq!(c.archive_keys.len(), c.succeeded, "{} keys", c.category);
        }
    }
}
