//! Manifest Tests
//!
//! Shape and invariants of the report a run produces.

use crate::common::*;
use qsbackup::AssetType;

fn mixed_env() -> TestEnv {
    let env = TestEnv::new();
    env.add_users(4);
    env.add_group("ops", &["user000", "user003"]);
    env.add_assets(AssetType::DataSet, 60);
    env.exports.add_asset(file_dataset("upload-1"));
    env.add_assets(AssetType::Analysis, 3);
    env.exports
        .submit_faults
        .always("datasets-bundle-1-", RemoteError::new("AccessDeniedException", "no"));
    env
}

#[tokio::test]
async fn mixed_run_satisfies_invariants() {
    let env = mixed_env();
    let report = env.run(BackupMode::Full).await;
    assert_manifest_invariants(&report);

    // Every mode's categories are present, even the empty ones
    assert_eq!(report.categories.len(), 7);
    assert_eq!(category(&report, Category::Dashboards).status, CategoryStatus::NoAssets);

    let stats = &report.statistics;
    let attempted: usize = report.categories.values().map(|c| c.attempted).sum();
    assert_eq!(stats.total_attempted, attempted);
    assert_eq!(stats.total_excluded, 1);
    assert_eq!(stats.total_archives, report.archive_keys().len());
    assert!(stats.success_rate > 0.0 && stats.success_rate < 100.0);
    assert!(report.has_failures());
}

#[tokio::test]
async fn identity_only_run_has_only_identity_categories() {
    let env = mixed_env();
    let report = env.run(BackupMode::UsersOnly).await;
    assert!(report.categories.keys().all(|c| c.is_identity()));
    assert!(env.exports.requests().is_empty());
}

#[tokio::test]
async fn manifest_and_report_files() {
    let env = mixed_env();
    let report = env.run(BackupMode::Full).await;
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("out/backup-manifest.json");
    let report_path = dir.path().join("out/backup-report.txt");
    report.write_manifest(&manifest_path).unwrap();
    report.write_report(&report_path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
    assert_eq!(json["metadata"]["mode"], "full");
    assert_eq!(json["metadata"]["account_id"], ACCOUNT);
    assert_eq!(json["metadata"]["cancelled"], false);
    assert_eq!(json["categories"]["datasets"]["status"], "PARTIAL");
    assert_eq!(
        json["categories"]["datasets"]["errors"][0]["error_kind"],
        "PERMISSION_DENIED"
    );
    assert_eq!(
        json["categories"]["datasets"]["exclusions"][0]["reason"],
        "UNSUPPORTED_SOURCE"
    );
    assert_eq!(json["categories"]["users"]["table"], dated(USERS_TABLE));

    let text = std::fs::read_to_string(&report_path).unwrap();
    assert!(text.contains("datasets#1 PERMISSION_DENIED"));
    assert!(text.contains("upload-1"));
}

#[tokio::test]
async fn fingerprint_is_stable_across_runs() {
    let first = TestEnv::new().run(BackupMode::AssetsOnly).await;
    let second = TestEnv::new().run(BackupMode::AssetsOnly).await;
    assert_eq!(first.metadata.config_fingerprint, second.metadata.config_fingerprint);
    assert_ne!(first.metadata.run_id, second.metadata.run_id);

    let mut changed = test_config();
    changed.export.max_assets_per_bundle = 10;
    let third = TestEnv::new()
        .engine()
        .run(&changed, BackupMode::AssetsOnly)
        .await
        .unwrap();
    assert_ne!(first.metadata.config_fingerprint, third.metadata.config_fingerprint);
}
