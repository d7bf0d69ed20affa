//! Cancellation Tests
//!
//! A cancelled run still returns a report. Units that finished are in it;
//! units stopped by the cancellation are not counted at all. A category whose
//! planned units all stopped is reported INCOMPLETE.

use crate::common::*;
use qsbackup::{AssetType, CancellationToken};
use std::time::Duration;

fn hanging_config() -> qsbackup::BackupConfig {
    let mut config = test_config();
    config.timeouts.max_poll_wait = Duration::from_secs(30);
    config
}

#[tokio::test]
async fn cancel_mid_run_keeps_finished_units() {
    let env = TestEnv::new();
    env.add_users(2);
    env.add_assets(AssetType::DataSet, 1);
    env.add_assets(AssetType::Dashboard, 2);
    env.exports.hang_jobs("dashboards-");

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        env.engine()
            .run_with_cancellation(&hanging_config(), BackupMode::Full, token),
    )
    .await
    .expect("run did not stop after cancellation")
    .unwrap();

    assert!(report.metadata.cancelled);
    assert_eq!(category(&report, Category::DataSets).succeeded, 1);
    assert_eq!(category(&report, Category::Users).succeeded, 2);

    let dashboards = category(&report, Category::Dashboards);
    assert_eq!(dashboards.attempted, 0);
    assert!(dashboards.planned > 0);
    assert!(dashboards.errors.is_empty());
    assert_eq!(dashboards.status, CategoryStatus::Incomplete);
    assert_eq!(category(&report, Category::DataSets).status, CategoryStatus::Success);
    assert_manifest_invariants(&report);
}

#[tokio::test]
async fn run_timeout_cancels_the_run() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Analysis, 1);
    env.add_assets(AssetType::Dashboard, 1);
    env.exports.hang_jobs("dashboards-");
    let mut config = hanging_config();
    config.timeouts.run_timeout = Some(Duration::from_millis(200));

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        env.engine().run(&config, BackupMode::AssetsOnly),
    )
    .await
    .expect("run timeout did not fire")
    .unwrap();

    assert!(report.metadata.cancelled);
    assert_eq!(category(&report, Category::Analyses).succeeded, 1);
    let dashboards = category(&report, Category::Dashboards);
    assert_eq!((dashboards.planned, dashboards.attempted), (1, 0));
    assert_eq!(dashboards.status, CategoryStatus::Incomplete);
    assert_manifest_invariants(&report);
}

#[tokio::test]
async fn pre_cancelled_run_attempts_nothing() {
    let env = TestEnv::new();
    env.add_users(3);
    env.add_assets(AssetType::DataSet, 5);
    let token = CancellationToken::new();
    token.cancel();

    let report = env
        .engine()
        .run_with_cancellation(&test_config(), BackupMode::Full, token)
        .await
        .unwrap();
    assert!(report.metadata.cancelled);
    assert_eq!(report.statistics.total_attempted, 0);
    assert!(report.categories.is_empty());
    assert!(env.exports.requests().is_empty());
    assert!(env.documents.table_names().is_empty());
}

#[tokio::test]
async fn uncancelled_run_is_not_marked_cancelled() {
    let env = TestEnv::new();
    env.add_assets(AssetType::Dashboard, 1);
    let mut config = test_config();
    config.timeouts.run_timeout = Some(Duration::from_secs(30));

    let report = env.engine().run(&config, BackupMode::AssetsOnly).await.unwrap();
    assert!(!report.metadata.cancelled);
}
