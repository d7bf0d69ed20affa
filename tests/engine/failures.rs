//! Failure Handling Tests
//!
//! One unit failing never stops its siblings; each failure lands in the
//! report with the right kind and the attempt counts the retry policy allows.

use crate::common::*;
use qsbackup::{AssetType, Error, UploadConfig};

fn throttled() -> RemoteError {
    RemoteError::new("ThrottlingException", "rate exceeded")
}

fn unavailable() -> RemoteError {
    RemoteError::new("ServiceUnavailable", "try again")
}

fn denied() -> RemoteError {
    RemoteError::new("AccessDeniedException", "not authorized")
}

// ============================================================================
// Before the run starts
// ============================================================================

#[tokio::test]
async fn invalid_config_makes_no_remote_calls() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    let mut config = test_config();
    config.aws.account_id = "1234".into();
    config.concurrency.workers = 0;

    let err: Error = env
        .engine()
        .run(&config, BackupMode::Full)
        .await
        .unwrap_err()
        .into();
    match err {
        Error::Configuration(errors) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().any(|e| e.contains("account_id")));
        }
        other => panic!("expected configuration error, got {}", other),
    }
    assert!(env.exports.submissions().is_empty());
    assert!(env.documents.table_names().is_empty());
}

#[tokio::test]
async fn rejected_credentials_abort_the_run() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    env.exports
        .access_faults
        .always("", RemoteError::new("ExpiredToken", "session expired"));

    let err: Error = env
        .engine()
        .run(&test_config(), BackupMode::AssetsOnly)
        .await
        .unwrap_err()
        .into();
    assert!(err.is_credentials());
    match err {
        Error::Credentials { service, .. } => assert_eq!(service, "export"),
        other => panic!("expected credentials error, got {}", other),
    }
    assert!(env.exports.submissions().is_empty());
}

#[tokio::test]
async fn preflight_failure_that_is_not_credentials_only_warns() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    env.objects.access_faults.push(BUCKET, [unavailable()]);

    let report = env.run(BackupMode::AssetsOnly).await;
    assert_eq!(category(&report, Category::Dashboards).succeeded, 1);
}

// ============================================================================
// Export failures
// ============================================================================

#[tokio::test]
async fn throttled_bundle_fails_alone() {
    let env = TestEnv::new();
    env.add_assets(AssetType::DataSet, 120);
    env.exports.submit_faults.always("datasets-bundle-2-", throttled());

    let report = env.run(BackupMode::AssetsOnly).await;
    let ds = category(&report, Category::DataSets);
    assert_eq!((ds.attempted, ds.succeeded, ds.failed), (3, 2, 1));
    assert_eq!(ds.status, CategoryStatus::Partial);
    assert_eq!(ds.errors.len(), 1);
    assert_eq!(ds.errors[0].resource_ref, "datasets#2");
    assert_eq!(ds.errors[0].error_kind, ErrorKind::Throttled);
    assert_eq!(env.exports.submissions_for("datasets-bundle-2-"), 3);
    assert!(ds.archive_keys.iter().all(|k| !k.contains("_bundle_2-")));
    assert_manifest_invariants(&report);
}

#[tokio::test]
async fn permission_denied_is_not_retried() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Analysis, 2);
    env.add_assets(AssetType::Dashboard, 2);
    env.exports.submit_faults.always("analyses-", denied());

    let report = env.run(BackupMode::AssetsOnly).await;
    let analyses = category(&report, Category::Analyses);
    assert_eq!(analyses.status, CategoryStatus::Failed);
    assert_eq!(analyses.errors[0].error_kind, ErrorKind::PermissionDenied);
    assert_eq!(env.exports.submissions_for("analyses-"), 1);
    assert_eq!(category(&report, Category::Dashboards).status, CategoryStatus::Success);
}

#[tokio::test]
async fn remote_job_failure_then_success_on_resubmit() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    env.exports.job_failures.push("dashboards-", [throttled()]);

    let report = env.run(BackupMode::AssetsOnly).await;
    let dashboards = category(&report, Category::Dashboards);
    assert_eq!((dashboards.attempted, dashboards.succeeded), (1, 1));
    assert_eq!(env.exports.submissions_for("dashboards-"), 2);

    // Each submission carries its own job id
    let submissions = env.exports.submissions();
    assert_ne!(submissions[0], submissions[1]);
}

#[tokio::test]
async fn failed_download_is_recorded() {
    let env = TestEnv::new();
    env.add_assets(AssetType::DataSource, 1);
    env.exports.download_faults.always("datasources-", unavailable());

    let report = env.run(BackupMode::AssetsOnly).await;
    let ds = category(&report, Category::DataSources);
    assert_eq!(ds.failed, 1);
    assert_eq!(ds.errors[0].error_kind, ErrorKind::DownloadFailed);
    assert!(env.objects.keys(BUCKET).is_empty());
}

// ============================================================================
// Upload failures
// ============================================================================

#[tokio::test]
async fn multipart_part_failure_aborts_and_retries() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    env.exports.set_archive_size("dashboards-", 3000);
    env.objects.part_faults.push(
        &key_prefix("dashboards"),
        [RemoteError::new("SlowDown", "reduce request rate")],
    );
    let mut config = test_config();
    config.upload = UploadConfig {
        multipart_threshold: 1024,
        part_size: 512,
        part_concurrency: 2,
    };

    let report = env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();
    let dashboards = category(&report, Category::Dashboards);
    assert_eq!(dashboards.succeeded, 1);
    assert_eq!(env.objects.aborted_uploads().len(), 1);
    assert_eq!(env.objects.completed_multiparts(), 1);
    assert_eq!(env.objects.open_uploads(), 0);

    let key = &dashboards.archive_keys[0];
    assert_eq!(env.objects.object(BUCKET, key).unwrap().len(), 3000);
}

#[tokio::test]
async fn verification_mismatch_is_recorded() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Analysis, 1);
    env.objects.tamper_heads(&key_prefix("analyses"), 10);

    let report = env.run(BackupMode::AssetsOnly).await;
    let analyses = category(&report, Category::Analyses);
    assert_eq!(analyses.failed, 1);
    assert_eq!(analyses.errors[0].error_kind, ErrorKind::VerificationFailed);
    assert!(analyses.archive_keys.is_empty());
}

#[tokio::test]
async fn missing_bucket_fails_every_bundle() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Analysis, 1);
    env.add_assets(AssetType::Dashboard, 1);
    let mut config = test_config();
    config.storage.bucket = "not-created".into();

    let report = env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();
    for c in [Category::Analyses, Category::Dashboards] {
        let result = category(&report, c);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].error_kind, ErrorKind::UploadFailed);
    }
    assert_eq!(report.statistics.success_rate, 0.0);
}

// ============================================================================
// Discovery failures
// ============================================================================

#[tokio::test]
async fn user_listing_failure_fails_users_and_memberships() {
    let env = TestEnv::new();
    env.add_users(2);
    env.add_group("admins", &["user000"]);
    env.directory.list_faults.always("users", unavailable());

    let report = env.run(BackupMode::UsersOnly).await;
    for c in [Category::Users, Category::Memberships] {
        let result = category(&report, c);
        assert_eq!(result.status, CategoryStatus::Failed);
        assert_eq!(result.attempted, 0);
        assert_eq!(result.errors[0].error_kind, ErrorKind::DiscoveryFailed);
    }
    assert_eq!(category(&report, Category::Groups).status, CategoryStatus::Success);
    assert!(report.has_failures());
}

#[tokio::test]
async fn asset_listing_failure_is_isolated() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Analysis, 1);
    env.add_assets(AssetType::Dashboard, 1);
    env.exports.list_faults.always("analyses", denied());

    let report = env.run(BackupMode::AssetsOnly).await;
    let analyses = category(&report, Category::Analyses);
    assert_eq!(analyses.errors[0].error_kind, ErrorKind::DiscoveryFailed);
    assert_eq!(analyses.errors[0].resource_ref, "analyses");
    assert_eq!(category(&report, Category::Dashboards).succeeded, 1);
}

#[tokio::test]
async fn transient_listing_failure_is_retried() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 2);
    env.exports.list_faults.push("dashboards", [unavailable(), throttled()]);

    let report = env.run(BackupMode::AssetsOnly).await;
    let dashboards = category(&report, Category::Dashboards);
    assert!(dashboards.errors.is_empty());
    assert_eq!(dashboards.succeeded, 1);
}

#[tokio::test]
async fn member_listing_failure_keeps_the_group() {
    let env = TestEnv::new();
    env.add_users(3);
    env.add_group("admins", &["user000", "user001"]);
    env.add_group("readers", &["user002"]);
    env.directory.member_faults.always("admins", denied());

    let report = env.run(BackupMode::UsersOnly).await;
    assert_eq!(category(&report, Category::Groups).succeeded, 2);
    assert_eq!(category(&report, Category::Memberships).succeeded, 1);

    let groups = env.documents.items(&dated(GROUPS_TABLE));
    let admins = groups
        .iter()
        .find(|item| item["group_name"] == qsbackup::AttributeValue::S("admins".into()))
        .unwrap();
    assert_eq!(admins["members"], qsbackup::AttributeValue::L(vec![]));
}
