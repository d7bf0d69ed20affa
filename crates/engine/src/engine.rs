//! Backup orchestration
//!
//! [`BackupEngine::run`] executes one backup:
//!
//! | Step | Where | Failure handling |
//! |------|-------|------------------|
//! | Validate configuration | caller's task | `ConfigError`, run never starts |
//! | Credential pre-flight | caller's task | `BackupError::Credentials`, run never starts |
//! | List users, groups, members | caller's task | `DISCOVERY_FAILED` for affected categories |
//! | Write identity tables | worker pool, one unit per table | scoped to the category |
//! | List and filter assets, plan bundles | caller's task | `DISCOVERY_FAILED` for that type |
//! | Export, download, publish | worker pool, one unit per bundle | scoped to the bundle |
//! | Finalize manifest | caller's task | always produced |
//!
//! Units run concurrently under one worker limit and report into the
//! [`OutcomeAggregator`]. Cancellation (operator token or run timeout)
//! stops units at their next suspend point; units it stops are left out of
//! the manifest, which is still produced and marked `cancelled`.

use crate::export_job::{ExportJobDriver, JobState};
use crate::identity_writer::{IdentityWriter, TableGuard};
use crate::outcome::{BackupReport, ErrorEntry, Note, OutcomeAggregator, RunMetadata};
use crate::publisher::ArchivePublisher;
use bytes::Bytes;
use chrono::NaiveDate;
use qsbackup_concurrency::{
    retry_transient, with_timeout, CancellationToken, RetryError, RetryPolicy, WorkerPool,
};
use qsbackup_core::identity::iso8601;
use qsbackup_core::{
    derive_memberships, system_clock, AssetType, BackupConfig, BackupError, BackupMode, Category,
    ErrorKind, Group, IdentityTableRef, Item, LogicalTable, RemoteError, RunId, SharedClock, User,
    TOOL_NAME, TOOL_VERSION,
};
use qsbackup_primitives::{archive_filename, object_key, Bundle, BundlePlanner, CatalogFilter};
use qsbackup_storage::{AssetExportService, DocumentStore, IdentityDirectory, ObjectMetadata, ObjectStore};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Handles to the four remote services a run talks to
///
/// The identity directory is expected to address
/// `config.aws.identity_region()`; everything else addresses
/// `config.aws.region`.
#[derive(Clone)]
pub struct ServiceClients {
    /// BI asset listing and export
    pub exports: Arc<dyn AssetExportService>,
    /// Users and groups
    pub directory: Arc<dyn IdentityDirectory>,
    /// Archive destination
    pub objects: Arc<dyn ObjectStore>,
    /// Identity table destination
    pub documents: Arc<dyn DocumentStore>,
}

/// Result of probing one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCheck {
    /// Service name
    pub service: &'static str,
    /// Failure, if the check did not succeed
    pub error: Option<RemoteError>,
}

impl ServiceCheck {
    /// Whether the check succeeded
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of [`BackupEngine::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Every configuration rule violated
    pub config_errors: Vec<String>,
    /// One check per service
    pub service_checks: Vec<ServiceCheck>,
}

impl ValidationResult {
    /// Whether the configuration is valid and every service answered
    pub fn is_valid(&self) -> bool {
        self.config_errors.is_empty() && self.service_checks.iter().all(ServiceCheck::is_ok)
    }

    /// Checks that failed
    pub fn failed_checks(&self) -> impl Iterator<Item = &ServiceCheck> {
        self.service_checks.iter().filter(|c| !c.is_ok())
    }
}

const EXPORT_SERVICE: &str = "export";
const IDENTITY_SERVICE: &str = "identity";
const OBJECT_STORE: &str = "object-store";
const DOCUMENT_STORE: &str = "document-store";

/// The backup orchestration engine
///
/// # Example
///
/// ```ignore
/// let engine = BackupEngine::new(clients);
/// let report = engine.run(&config, BackupMode::Full).await?;
/// report.write_manifest("backup-manifest.json")?;
/// ```
pub struct BackupEngine {
    clients: ServiceClients,
    clock: SharedClock,
}

impl BackupEngine {
    /// Create an engine over `clients` using the system clock
    pub fn new(clients: ServiceClients) -> Self {
        BackupEngine {
            clients,
            clock: system_clock(),
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Check a configuration and check every service without backing anything up
    pub async fn validate(&self, config: &BackupConfig) -> ValidationResult {
        let config_errors = match config.validate() {
            Ok(()) => Vec::new(),
            Err(e) => e.errors,
        };
        let service_checks = self
            .preflight(config, BackupMode::Full)
            .await
            .into_iter()
            .map(|(service, result)| ServiceCheck {
                service,
                error: result.err(),
            })
            .collect();
        ValidationResult {
            config_errors,
            service_checks,
        }
    }

    /// Run a backup to completion
    pub async fn run(&self, config: &BackupConfig, mode: BackupMode) -> Result<BackupReport, BackupError> {
        self.run_with_cancellation(config, mode, CancellationToken::new())
            .await
    }

    /// Run a backup that stops early when `token` is cancelled
    ///
    /// Returns `Err` only when the run could not start: an invalid
    /// configuration or rejected credentials. Everything after that is
    /// recorded in the report.
    pub async fn run_with_cancellation(
        &self,
        config: &BackupConfig,
        mode: BackupMode,
        token: CancellationToken,
    ) -> Result<BackupReport, BackupError> {
        config.validate()?;
        let planner = BundlePlanner::new(config.export.max_assets_per_bundle)?;

        for (service, result) in self.preflight(config, mode).await {
            match result {
                Err(e) if e.is_credentials() => {
                    error!(service, error = %e, "credentials rejected");
                    return Err(BackupError::Credentials { service, source: e });
                }
                Err(e) => warn!(service, error = %e, "pre-flight check failed, continuing"),
                Ok(()) => debug!(service, "pre-flight check passed"),
            }
        }

        let run_id = RunId::new();
        let started_at = self.clock.now();
        let run_token = token.child_token();
        let ctx = Arc::new(RunContext {
            clients: self.clients.clone(),
            config: config.clone(),
            policy: RetryPolicy::from(&config.retry),
            clock: Arc::clone(&self.clock),
            token: run_token.clone(),
            aggregator: OutcomeAggregator::new(),
            tables: TableGuard::new(),
            run_date: started_at.date_naive(),
        });

        let span = info_span!("backup_run", run_id = %run_id.short(), mode = %mode);
        let report = async {
            info!(
                account = %config.aws.account_id,
                region = %config.aws.region,
                identity_region = %config.aws.identity_region(),
                bucket = %config.storage.bucket,
                workers = config.concurrency.workers,
                "backup started"
            );

            let timer = config.timeouts.run_timeout.map(|budget| {
                let token = run_token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(budget) => {
                            warn!(budget_ms = budget.as_millis() as u64, "run timeout reached, cancelling");
                            token.cancel();
                        }
                        _ = token.cancelled() => {}
                    }
                })
            });

            let mut pool = WorkerPool::new(config.concurrency.workers);
            if mode.includes_identity() {
                ctx.schedule_identity(&mut pool).await;
            }
            if mode.includes_assets() {
                ctx.schedule_assets(&mut pool, &planner).await;
            }
            let units = pool.len();
            pool.join_all().await;

            if let Some(timer) = timer {
                timer.abort();
            }

            let cancelled = run_token.is_cancelled();
            let metadata = RunMetadata {
                run_id,
                started_at,
                finished_at: self.clock.now(),
                mode,
                config_fingerprint: config.fingerprint(),
                cancelled,
                account_id: config.aws.account_id.clone(),
                region: config.aws.region.clone(),
                tool_version: TOOL_VERSION.to_string(),
            };
            let report = ctx.aggregator.finalize(metadata);
            let stats = &report.statistics;
            info!(
                units,
                attempted = stats.total_attempted,
                succeeded = stats.total_succeeded,
                failed = stats.total_failed,
                excluded = stats.total_excluded,
                cancelled,
                "backup finished"
            );
            report
        }
        .instrument(span)
        .await;
        Ok(report)
    }

    async fn preflight(&self, config: &BackupConfig, mode: BackupMode) -> Vec<(&'static str, Result<(), RemoteError>)> {
        let call = config.timeouts.call_timeout;
        let mut checks = Vec::new();
        if mode.includes_identity() {
            checks.push((
                IDENTITY_SERVICE,
                with_timeout(call, "check_access", self.clients.directory.check_access()).await,
            ));
            checks.push((
                DOCUMENT_STORE,
                with_timeout(call, "check_access", self.clients.documents.check_access()).await,
            ));
        }
        if mode.includes_assets() {
            checks.push((
                EXPORT_SERVICE,
                with_timeout(call, "check_access", self.clients.exports.check_access()).await,
            ));
            checks.push((
                OBJECT_STORE,
                with_timeout(
                    call,
                    "check_access",
                    self.clients.objects.check_access(&config.storage.bucket),
                )
                .await,
            ));
        }
        checks
    }
}

/// State shared by every unit of one run
struct RunContext {
    clients: ServiceClients,
    config: BackupConfig,
    policy: RetryPolicy,
    clock: SharedClock,
    token: CancellationToken,
    aggregator: OutcomeAggregator,
    tables: TableGuard,
    run_date: NaiveDate,
}

impl RunContext {
    async fn list<T, F, Fut>(&self, label: &'static str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let call = self.config.timeouts.call_timeout;
        retry_transient(&self.policy, &self.token, label, |_| with_timeout(call, label, op())).await
    }

    fn discovery_failed(&self, categories: &[Category], source: &str, error: &RetryError) {
        for &category in categories {
            self.aggregator
                .record_error(category, ErrorKind::DiscoveryFailed, source, error.to_string());
        }
    }

    async fn schedule_identity(self: &Arc<Self>, pool: &mut WorkerPool<()>) {
        let directory = self.clients.directory.as_ref();

        let users = match self.list("list_users", move || directory.list_users()).await {
            Ok(users) => Some(users),
            Err(RetryError::Cancelled) => return,
            Err(e) => {
                error!(error = %e, "user listing failed");
                self.discovery_failed(&[Category::Users, Category::Memberships], "users", &e);
                None
            }
        };
        let groups = match self.list("list_groups", move || directory.list_groups()).await {
            Ok(groups) => Some(self.with_members(groups).await),
            Err(RetryError::Cancelled) => return,
            Err(e) => {
                error!(error = %e, "group listing failed");
                self.discovery_failed(&[Category::Groups, Category::Memberships], "groups", &e);
                None
            }
        };
        info!(
            users = users.as_ref().map_or(0, Vec::len),
            groups = groups.as_ref().map_or(0, Vec::len),
            "identity discovered"
        );

        let now = self.clock.now();
        let memberships = match (&users, &groups) {
            (Some(u), Some(g)) => Some(derive_memberships(u, g)),
            _ => None,
        };
        let tables = &self.config.tables;
        let work: [(LogicalTable, &str, Option<Vec<Item>>); 3] = [
            (
                LogicalTable::Users,
                tables.users.as_str(),
                users.map(|v| v.iter().map(|u: &User| u.to_item(now)).collect()),
            ),
            (
                LogicalTable::Groups,
                tables.groups.as_str(),
                groups.map(|v| v.iter().map(|g: &Group| g.to_item(now)).collect()),
            ),
            (
                LogicalTable::Memberships,
                tables.memberships.as_str(),
                memberships.map(|v| v.iter().map(|m| m.to_item(now)).collect()),
            ),
        ];

        for (logical, base_name, items) in work {
            let Some(items) = items else { continue };
            if items.is_empty() {
                self.aggregator.record_note(Category::from(logical), Note::NoAssets);
                continue;
            }
            self.aggregator.record_planned(Category::from(logical), items.len());
            let table = IdentityTableRef::for_run(logical, base_name, self.run_date);
            let span = info_span!("identity", table = %table.dated_name);
            pool.spawn(Arc::clone(self).write_identity(table, items).instrument(span));
        }
    }

    /// Fill in each group's members; a group whose members cannot be listed
    /// is kept with none
    async fn with_members(&self, mut groups: Vec<Group>) -> Vec<Group> {
        let directory = self.clients.directory.as_ref();
        for group in groups.iter_mut() {
            let name = group.group_name.as_str();
            match self
                .list("list_group_members", move || directory.list_group_members(name))
                .await
            {
                Ok(members) => group.members = members,
                Err(e) => {
                    warn!(group = %group.group_name, error = %e, "group members unavailable, backing up group without members");
                    group.members.clear();
                }
            }
        }
        groups
    }

    async fn write_identity(self: Arc<Self>, mut table: IdentityTableRef, items: Vec<Item>) {
        let writer = IdentityWriter::new(
            self.clients.documents.as_ref(),
            &self.tables,
            &self.config.timeouts,
            &self.policy,
            self.config.identity.batch_size,
            &self.token,
        );
        match writer.write(&mut table, items).await {
            Some(outcome) => self.aggregator.record_identity(outcome),
            None => info!("identity category skipped: run cancelled"),
        }
    }

    async fn schedule_assets(self: &Arc<Self>, pool: &mut WorkerPool<()>, planner: &BundlePlanner) {
        let mut filter = CatalogFilter::new(self.config.export.cascade_exclusions);
        let exports = self.clients.exports.as_ref();

        for asset_type in AssetType::ALL {
            let category = Category::from(asset_type);
            let listed = self
                .list("list_assets", move || exports.list_assets(asset_type))
                .await;
            let assets = match listed {
                Ok(assets) => assets,
                Err(RetryError::Cancelled) => {
                    info!(%asset_type, "asset discovery stopped: run cancelled");
                    return;
                }
                Err(e) => {
                    error!(%asset_type, error = %e, "asset listing failed");
                    self.discovery_failed(&[category], asset_type.plural(), &e);
                    continue;
                }
            };

            let discovered = assets.len();
            let outcome = filter.filter(assets);
            for exclusion in &outcome.excluded {
                self.aggregator.record_exclusion(category, exclusion);
            }
            if outcome.eligible.is_empty() {
                self.aggregator.record_note(category, Note::NoAssets);
                if discovered > 0 {
                    self.aggregator.record_note(category, Note::AllExcluded);
                }
            }

            let plan = planner.plan(asset_type, &outcome.eligible);
            info!(
                %asset_type,
                discovered,
                eligible = outcome.eligible.len(),
                excluded = outcome.excluded.len(),
                bundles = plan.len(),
                "assets planned"
            );
            if !plan.bundles.is_empty() {
                self.aggregator.record_planned(category, plan.bundles.len());
            }
            for bundle in plan.bundles {
                let span = info_span!("bundle", bundle = %bundle.reference());
                pool.spawn(Arc::clone(self).backup_bundle(bundle).instrument(span));
            }
        }
    }

    async fn backup_bundle(self: Arc<Self>, bundle: Bundle) {
        let category = Category::from(bundle.asset_type);
        let reference = bundle.reference();

        let driver = ExportJobDriver::new(
            self.clients.exports.as_ref(),
            &self.config.export,
            &self.config.timeouts,
            &self.policy,
            self.clock.as_ref(),
            &self.token,
        );
        let job = driver.drive(&bundle).await;
        let handle = match (job.state, job.archive_handle, job.error) {
            (JobState::Succeeded, Some(handle), _) => handle,
            (JobState::Cancelled, _, _) => {
                info!("bundle skipped: run cancelled");
                return;
            }
            (_, _, Some(e)) => {
                self.aggregator
                    .record_bundle_failure(category, ErrorEntry::new(reference, e.kind, e.source.to_string()));
                return;
            }
            (state, _, None) => {
                self.aggregator.record_bundle_failure(
                    category,
                    ErrorEntry::new(reference, ErrorKind::Unknown, format!("export ended in {} without an archive", state)),
                );
                return;
            }
        };
        let finished_at = job.finished_at.unwrap_or_else(|| self.clock.now());

        let exports = self.clients.exports.as_ref();
        let handle = &handle;
        let body: Bytes = match self
            .list("download_archive", move || exports.download_archive(handle))
            .await
        {
            Ok(body) => body,
            Err(RetryError::Cancelled) => {
                info!("bundle skipped before download: run cancelled");
                return;
            }
            Err(e) => {
                error!(error = %e, "archive download failed");
                self.aggregator
                    .record_bundle_failure(category, ErrorEntry::new(reference, ErrorKind::DownloadFailed, e.to_string()));
                return;
            }
        };

        let storage = &self.config.storage;
        let filename = archive_filename(bundle.asset_type, bundle.index, bundle.is_sole_bundle, finished_at);
        let key = object_key(&storage.prefix, storage.prefix_format, finished_at.date_naive(), bundle.asset_type, &filename);
        let mut metadata = ObjectMetadata::new();
        metadata.insert("backup-tool".to_string(), TOOL_NAME.to_string());
        metadata.insert("backup-type".to_string(), bundle.asset_type.plural().to_string());
        metadata.insert("backup-timestamp".to_string(), iso8601(finished_at));

        let publisher = ArchivePublisher::new(
            self.clients.objects.as_ref(),
            &storage.bucket,
            &self.config.upload,
            &self.policy,
            self.config.timeouts.call_timeout,
            &self.token,
        );
        match publisher.publish(&key, body, metadata).await {
            Ok(result) => self.aggregator.record_bundle_success(category, result.s3_key),
            Err(crate::publisher::PublishError::Cancelled) => {
                info!(key = %key, "bundle upload stopped: run cancelled");
            }
            Err(crate::publisher::PublishError::Failed { kind, message, .. }) => {
                self.aggregator
                    .record_bundle_failure(category, ErrorEntry::new(reference, kind, message));
            }
        }
    }
}
