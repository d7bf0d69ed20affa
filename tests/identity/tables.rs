//! Dated Table Tests
//!
//! One physical table per logical table per day, shared by every run on
//! that day.

use crate::common::*;
use chrono::{TimeZone, Utc};
use std::time::Duration;

fn seed(env: &TestEnv) {
    env.add_users(3);
    env.add_group("admins", &["user000", "user001"]);
    env.add_group("readers", &["user002"]);
}

#[tokio::test]
async fn tables_are_named_by_run_date() {
    let env = TestEnv::new();
    seed(&env);
    env.run(BackupMode::UsersOnly).await;

    let mut expected = vec![dated(GROUPS_TABLE), dated(USERS_TABLE), dated(MEMBERSHIPS_TABLE)];
    expected.sort();
    assert_eq!(env.documents.table_names(), expected);
}

#[tokio::test]
async fn rerun_on_the_same_day_reuses_tables() {
    let env = TestEnv::new();
    seed(&env);
    let first = env.run(BackupMode::UsersOnly).await;
    let second = env.run(BackupMode::UsersOnly).await;

    assert_eq!(env.documents.create_calls(&dated(USERS_TABLE)), 1);
    assert_eq!(env.documents.table_names().len(), 3);
    assert_eq!(env.documents.items(&dated(USERS_TABLE)).len(), 3);
    for c in Category::IDENTITY {
        assert_eq!(category(&first, c).succeeded, category(&second, c).succeeded);
        assert_eq!(category(&second, c).status, CategoryStatus::Success);
    }
}

#[tokio::test]
async fn next_day_gets_new_tables() {
    let env = TestEnv::new();
    seed(&env);
    env.run(BackupMode::UsersOnly).await;
    let next_day = Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 1).unwrap();
    let report = env
        .engine_at(next_day)
        .run(&test_config(), BackupMode::UsersOnly)
        .await
        .unwrap();

    assert_eq!(env.documents.table_names().len(), 6);
    assert_eq!(
        category(&report, Category::Users).table.as_deref(),
        Some("2024-03-08-quicksight-users-backup")
    );
    // Yesterday's backup is untouched
    assert_eq!(env.documents.items(&dated(USERS_TABLE)).len(), 3);
}

#[tokio::test]
async fn tables_keep_the_start_date_across_midnight() {
    let env = TestEnv::new();
    seed(&env);
    env.add_assets(qsbackup::AssetType::DataSet, 1);

    let report = env
        .engine_with_clock(midnight_clock())
        .run(&test_config(), BackupMode::Full)
        .await
        .unwrap();

    let mut expected = vec![dated(GROUPS_TABLE), dated(USERS_TABLE), dated(MEMBERSHIPS_TABLE)];
    expected.sort();
    assert_eq!(env.documents.table_names(), expected);
    for c in Category::IDENTITY {
        let table = category(&report, c).table.clone().unwrap();
        assert!(table.starts_with("2024-03-07-"), "{} wrote {}", c, table);
        assert_eq!(category(&report, c).status, CategoryStatus::Success);
    }
}

#[tokio::test]
async fn concurrent_runs_both_succeed() {
    let env = TestEnv::new();
    seed(&env);
    env.documents.set_create_latency(Duration::from_millis(50));
    let config = test_config();
    let (a, b) = (env.engine(), env.engine());

    let (first, second) = tokio::join!(
        a.run(&config, BackupMode::UsersOnly),
        b.run(&config, BackupMode::UsersOnly)
    );
    for report in [first.unwrap(), second.unwrap()] {
        assert!(!report.has_failures());
        assert_eq!(category(&report, Category::Users).succeeded, 3);
    }
    assert_eq!(env.documents.table_names().len(), 3);
}

#[tokio::test]
async fn tables_that_stay_creating_are_waited_for() {
    let env = TestEnv::new();
    seed(&env);
    env.documents.set_creating_polls(3);

    let report = env.run(BackupMode::UsersOnly).await;
    assert!(!report.has_failures());
    assert_eq!(category(&report, Category::Groups).succeeded, 2);
}

#[tokio::test]
async fn one_table_failing_leaves_the_others() {
    let env = TestEnv::new();
    seed(&env);
    env.documents.create_faults.always(
        &dated(GROUPS_TABLE),
        RemoteError::new("AccessDeniedException", "no CreateTable"),
    );

    let report = env.run(BackupMode::UsersOnly).await;
    let groups = category(&report, Category::Groups);
    assert_eq!(groups.status, CategoryStatus::Failed);
    assert_eq!((groups.attempted, groups.failed), (2, 2));
    assert_eq!(groups.errors.len(), 1);
    assert_eq!(groups.errors[0].error_kind, ErrorKind::TableCreationFailed);
    assert_eq!(groups.errors[0].resource_ref, dated(GROUPS_TABLE));

    assert_eq!(category(&report, Category::Users).status, CategoryStatus::Success);
    assert_eq!(category(&report, Category::Memberships).status, CategoryStatus::Success);
}

#[tokio::test]
async fn custom_table_names() {
    let env = TestEnv::new();
    seed(&env);
    let mut config = test_config();
    config.tables.users = "bi-users".into();

    let report = env.engine().run(&config, BackupMode::UsersOnly).await.unwrap();
    assert_eq!(
        category(&report, Category::Users).table.as_deref(),
        Some("2024-03-07-bi-users")
    );
    assert_eq!(env.documents.items("2024-03-07-bi-users").len(), 3);
}
