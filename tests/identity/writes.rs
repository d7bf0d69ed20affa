//! Record Write Tests
//!
//! Item layout, batching, and partial-write handling.

use crate::common::*;
use qsbackup::AttributeValue;

fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

#[tokio::test]
async fn items_carry_the_documented_attributes() {
    let env = TestEnv::new();
    env.add_users(2);
    let mut bare = qsbackup::User::new("bare", "arn:aws:quicksight:us-east-1:123456789012:user/default/bare");
    bare.active = false;
    env.directory.add_user(bare);
    env.add_group("admins", &["user000", "bare", "nobody"]);

    env.run(BackupMode::UsersOnly).await;

    let users = env.documents.items(&dated(USERS_TABLE));
    let bare = users.iter().find(|u| u["user_name"] == s("bare")).unwrap();
    assert!(!bare.contains_key("email"));
    assert!(!bare.contains_key("role"));
    assert_eq!(bare["active"], AttributeValue::Bool(false));
    assert_eq!(bare["backup_timestamp"], s("2024-03-07T14:30:05Z"));

    let user000 = users.iter().find(|u| u["user_name"] == s("user000")).unwrap();
    assert_eq!(user000["email"], s("user000@example.com"));

    let groups = env.documents.items(&dated(GROUPS_TABLE));
    assert_eq!(
        groups[0]["members"],
        AttributeValue::L(vec![s("user000"), s("bare"), s("nobody")])
    );

    // Unknown members produce no membership
    let ids: Vec<AttributeValue> = env
        .documents
        .items(&dated(MEMBERSHIPS_TABLE))
        .into_iter()
        .map(|m| m["membership_id"].clone())
        .collect();
    assert_eq!(ids, vec![s("bare#admins"), s("user000#admins")]);
}

#[tokio::test]
async fn records_are_written_in_batches() {
    let env = TestEnv::new();
    env.add_users(25);
    let mut config = test_config();
    config.identity.batch_size = 10;

    let report = env.engine().run(&config, BackupMode::UsersOnly).await.unwrap();
    assert_eq!(category(&report, Category::Users).succeeded, 25);
    // No groups, so only the users table is written
    assert_eq!(env.documents.batch_calls(), 3);
}

#[tokio::test]
async fn unprocessed_records_are_retried() {
    let env = TestEnv::new();
    env.add_users(5);
    env.documents.leave_unprocessed(&dated(USERS_TABLE), 2, 1);

    let report = env.run(BackupMode::UsersOnly).await;
    let users = category(&report, Category::Users);
    assert_eq!((users.succeeded, users.failed), (5, 0));
    assert_eq!(env.documents.items(&dated(USERS_TABLE)).len(), 5);
}

#[tokio::test]
async fn records_never_processed_are_reported_by_key() {
    let env = TestEnv::new();
    env.add_users(5);
    env.documents.leave_unprocessed(&dated(USERS_TABLE), 2, 10);

    let report = env.run(BackupMode::UsersOnly).await;
    let users = category(&report, Category::Users);
    assert_eq!((users.attempted, users.succeeded, users.failed), (5, 3, 2));
    assert_eq!(users.status, CategoryStatus::Partial);
    let refs: Vec<&str> = users.errors.iter().map(|e| e.resource_ref.as_str()).collect();
    assert_eq!(refs, vec!["user003", "user004"]);
    assert!(users.errors.iter().all(|e| e.error_kind == ErrorKind::WriteFailed));
}

#[tokio::test]
async fn write_rejected_outright_fails_the_batch() {
    let env = TestEnv::new();
    env.add_users(3);
    env.documents.write_faults.always(
        &dated(USERS_TABLE),
        RemoteError::new("ValidationException", "bad item"),
    );

    let report = env.run(BackupMode::UsersOnly).await;
    let users = category(&report, Category::Users);
    assert_eq!((users.attempted, users.failed), (3, 3));
    assert_eq!(users.status, CategoryStatus::Failed);
}

#[tokio::test]
async fn empty_directory_creates_no_tables() {
    let env = TestEnv::new();
    let report = env.run(BackupMode::UsersOnly).await;

    for c in Category::IDENTITY {
        let result = category(&report, c);
        assert_eq!(result.status, CategoryStatus::NoAssets);
        assert_eq!(result.notes, vec![qsbackup::Note::NoAssets]);
        assert!(result.table.is_none());
    }
    assert!(env.documents.table_names().is_empty());
}
