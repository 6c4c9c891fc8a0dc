use cloudsync_server::config::OrphanPolicy;
use cloudsync_server::entity::file_record;
use cloudsync_server::error::AppError;
use sea_orm::{DatabaseBackend, DatabaseConnection, DbErr, MockDatabase};

use crate::common::{TestApp, owner};

/// A registry that has no record for the name and fails the write.
fn failing_registry() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Sqlite)
        .append_query_results([Vec::<file_record::Model>::new()])
        .append_query_errors([DbErr::Custom("registry unavailable".into())])
        .append_exec_errors([DbErr::Custom("registry unavailable".into())])
        .into_connection()
}

#[tokio::test]
async fn deferred_policy_leaves_the_new_blob() {
    let app = TestApp::with_db(failing_registry(), OrphanPolicy::Defer).await;
    let alice = owner("alice");

    let result = app.try_upload(&alice, "a.txt", b"orphan me").await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    assert!(app.blob_exists(&alice, b"orphan me").await);
    assert_eq!(app.staging_count(), 0);
}

#[tokio::test]
async fn rollback_policy_removes_the_new_blob() {
    let app = TestApp::with_db(failing_registry(), OrphanPolicy::Rollback).await;
    let alice = owner("alice");

    let result = app.try_upload(&alice, "a.txt", b"roll me back").await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    assert!(!app.blob_exists(&alice, b"roll me back").await);
    assert_eq!(app.blob_count(&alice), 0);
}

#[tokio::test]
async fn rollback_never_touches_a_pre_existing_blob() {
    let app = TestApp::with_db(failing_registry(), OrphanPolicy::Rollback).await;
    let alice = owner("alice");
    app.store()
        .put(alice.as_str(), b"already here")
        .await
        .unwrap();

    let result = app.try_upload(&alice, "a.txt", b"already here").await;

    assert!(result.is_err());
    assert!(app.blob_exists(&alice, b"already here").await);
}
