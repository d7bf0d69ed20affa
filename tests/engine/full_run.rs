//! Full Run Tests
//!
//! Happy-path runs: bundling, key layout, exclusions, object metadata.

use crate::common::*;
use qsbackup::{AssetType, ExclusionReason, Note, PrefixFormat};

// ============================================================================
// Bundling and keys
// ============================================================================

#[tokio::test]
async fn full_run_backs_up_identity_and_assets() {
    let env = TestEnv::new();
    env.add_users(3);
    env.add_group("admins", &["user000", "user001", "ghost"]);
    env.add_group("readers", &["user002"]);
    env.add_assets(AssetType::DataSource, 1);
    env.add_assets(AssetType::DataSet, 120);
    env.add_assets(AssetType::Analysis, 2);
    env.add_assets(AssetType::Dashboard, 1);

    let report = env.run(BackupMode::Full).await;
    assert!(!report.metadata.cancelled);
    assert!(!report.has_failures());

    let users = category(&report, Category::Users);
    assert_eq!((users.attempted, users.succeeded), (3, 3));
    assert_eq!(users.table.as_deref(), Some(dated(USERS_TABLE).as_str()));
    assert_eq!(category(&report, Category::Groups).succeeded, 2);
    assert_eq!(category(&report, Category::Memberships).succeeded, 3);

    let datasets = category(&report, Category::DataSets);
    assert_eq!(datasets.attempted, 3);
    assert_eq!(
        datasets.archive_keys,
        vec![
            format!("{}datasets_bundle_1-143005.zip", key_prefix("datasets")),
            format!("{}datasets_bundle_2-143005.zip", key_prefix("datasets")),
            format!("{}datasets_bundle_3-143005.zip", key_prefix("datasets")),
        ]
    );
    assert_eq!(
        category(&report, Category::DataSources).archive_keys,
        vec![format!("{}datasources-143005.zip", key_prefix("datasources"))]
    );
    assert_eq!(
        category(&report, Category::Dashboards).archive_keys,
        vec![format!("{}dashboards-143005.zip", key_prefix("dashboards"))]
    );

    let stored = env.objects.keys(BUCKET);
    assert_eq!(stored.len(), 6);
    assert_eq!(report.statistics.total_archives, 6);
    assert_eq!(report.statistics.success_rate, 100.0);
}

#[tokio::test]
async fn seventy_five_assets_in_bundles_of_twenty_five() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Analysis, 75);
    let mut config = test_config();
    config.export.max_assets_per_bundle = 25;

    let report = env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();
    let analyses = category(&report, Category::Analyses);
    assert_eq!(analyses.succeeded, 3);

    let mut sizes: Vec<usize> = env
        .exports
        .requests()
        .iter()
        .filter(|r| r.asset_type == AssetType::Analysis)
        .map(|r| r.asset_arns.len())
        .collect();
    sizes.sort();
    assert_eq!(sizes, vec![25, 25, 25]);
}

#[tokio::test]
async fn ten_assets_make_one_sole_bundle() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 10);

    let report = env.run(BackupMode::AssetsOnly).await;
    let dashboards = category(&report, Category::Dashboards);
    assert_eq!(dashboards.succeeded, 1);
    assert!(!dashboards.archive_keys[0].contains("_bundle_"));
    assert_eq!(env.exports.requests()[0].asset_arns.len(), 10);
}

#[tokio::test]
async fn key_date_follows_export_completion() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);

    let report = env
        .engine_with_clock(midnight_clock())
        .run(&test_config(), BackupMode::AssetsOnly)
        .await
        .unwrap();

    let key = "quicksight-backups/2024/03/08/dashboards/dashboards-000030.zip";
    assert_eq!(category(&report, Category::Dashboards).archive_keys, vec![key.to_string()]);
    assert!(env.objects.object(BUCKET, key).is_some());
}

#[tokio::test]
async fn bundles_preserve_discovery_order() {
    let env = TestEnv::new();
    env.add_assets(AssetType::DataSource, 7);
    let mut config = test_config();
    config.export.max_assets_per_bundle = 3;

    env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();

    let mut requests = env.exports.requests();
    requests.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    let concatenated: Vec<String> = requests.into_iter().flat_map(|r| r.asset_arns).collect();
    let expected: Vec<String> = (0..7)
        .map(|i| asset(AssetType::DataSource, &format!("datasources-{:03}", i)).arn)
        .collect();
    assert_eq!(concatenated, expected);
}

#[tokio::test]
async fn dashed_prefix_format() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    let mut config = test_config();
    config.storage.prefix = "backups/prod".into();
    config.storage.prefix_format = PrefixFormat::Dashed;

    let report = env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();
    assert_eq!(
        category(&report, Category::Dashboards).archive_keys,
        vec!["backups/prod/2024-03-07/dashboards/dashboards-143005.zip".to_string()]
    );
}

#[tokio::test]
async fn archives_carry_backup_metadata() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Analysis, 1);

    let report = env.run(BackupMode::AssetsOnly).await;
    let key = &category(&report, Category::Analyses).archive_keys[0];
    let metadata = env.objects.metadata(BUCKET, key).unwrap();
    assert_eq!(metadata["backup-tool"], "qsbackup");
    assert_eq!(metadata["backup-type"], "analyses");
    assert_eq!(metadata["backup-timestamp"], "2024-03-07T14:30:05Z");
    assert!(metadata.contains_key("xxh3"));
}

#[tokio::test]
async fn export_options_reach_the_service() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    let mut config = test_config();
    config.export.include_permissions = false;

    env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();
    let request = &env.exports.requests()[0];
    assert!(!request.options.include_permissions);
    assert!(request.options.include_dependencies);
}

// ============================================================================
// Empty and excluded categories
// ============================================================================

#[tokio::test]
async fn zero_datasources_is_no_assets_not_an_error() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);

    let report = env.run(BackupMode::AssetsOnly).await;
    let ds = category(&report, Category::DataSources);
    assert_eq!((ds.attempted, ds.succeeded, ds.failed), (0, 0, 0));
    assert!(ds.errors.is_empty());
    assert_eq!(ds.notes, vec![Note::NoAssets]);
    assert_eq!(ds.status, CategoryStatus::NoAssets);
}

#[tokio::test]
async fn file_datasets_never_exported() {
    let env = TestEnv::new();
    env.exports.add_asset(file_dataset("upload-1"));
    env.exports.add_asset(spice_dataset("spice-1"));
    env.exports.add_asset(file_dataset("upload-2"));
    env.exports.add_asset(spice_dataset("spice-2"));

    let report = env.run(BackupMode::AssetsOnly).await;
    let ds = category(&report, Category::DataSets);
    assert_eq!(ds.succeeded, 1);
    let excluded: Vec<&str> = ds.exclusions.iter().map(|x| x.resource_ref.as_str()).collect();
    assert_eq!(excluded, vec!["upload-1", "upload-2"]);
    assert!(ds
        .exclusions
        .iter()
        .all(|x| x.reason == ExclusionReason::UnsupportedSource));

    let exported: Vec<String> = env
        .exports
        .requests()
        .into_iter()
        .flat_map(|r| r.asset_arns)
        .collect();
    assert!(exported.iter().all(|arn| !arn.contains("upload-")));
    assert_eq!(ds.failed, 0);
}

#[tokio::test]
async fn all_excluded_is_reported_as_excluded() {
    let env = TestEnv::new();
    env.exports.add_asset(file_dataset("upload-1"));

    let report = env.run(BackupMode::AssetsOnly).await;
    let ds = category(&report, Category::DataSets);
    assert_eq!(ds.status, CategoryStatus::Excluded);
    assert!(ds.notes.contains(&Note::AllExcluded));
    assert!(!report.has_failures());
}

#[tokio::test]
async fn cascade_excludes_dependents_when_enabled() {
    let env = TestEnv::new();
    env.exports.add_asset(file_dataset("upload-1"));
    env.exports.add_asset(asset(AssetType::Analysis, "a-1").with_dependencies(["upload-1"]));
    env.exports.add_asset(asset(AssetType::Analysis, "a-2"));

    let mut config = test_config();
    config.export.cascade_exclusions = true;
    let report = env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();
    let analyses = category(&report, Category::Analyses);
    assert_eq!(analyses.exclusions.len(), 1);
    assert_eq!(analyses.exclusions[0].reason, ExclusionReason::DependsOnExcluded);
    assert_eq!(analyses.succeeded, 1);

    // Default settings leave dependents alone
    let env = TestEnv::new();
    env.exports.add_asset(file_dataset("upload-1"));
    env.exports.add_asset(asset(AssetType::Analysis, "a-1").with_dependencies(["upload-1"]));
    let report = env.run(BackupMode::AssetsOnly).await;
    assert!(category(&report, Category::Analyses).exclusions.is_empty());
}
