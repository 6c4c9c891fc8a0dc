use ::common::storage::ContentHash;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use cloudsync_server::error::AppError;
use cloudsync_server::handlers::sync::reconcile;
use cloudsync_server::models::ClientFileEntry;

use crate::common::{TestApp, owner};

fn entry(name: &str, content: &[u8], modified: DateTime<Utc>) -> ClientFileEntry {
    ClientFileEntry {
        name: name.into(),
        hash: ContentHash::compute(content).to_hex(),
        last_modified: modified.to_rfc3339_opts(SecondsFormat::Nanos, true),
    }
}

#[tokio::test]
async fn newer_server_copy_goes_to_download() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");
    let server = app.upload(&alice, "a.txt", b"server edit").await;

    let client_time = server.last_modified - Duration::hours(1);
    let plan = reconcile(
        &app.state,
        &alice,
        vec![entry("a.txt", b"stale local", client_time)],
    )
    .await
    .unwrap();

    assert!(plan.to_upload.is_empty());
    assert_eq!(plan.to_download, vec![server]);
}

#[tokio::test]
async fn newer_client_copy_goes_to_upload() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");
    let server = app.upload(&alice, "a.txt", b"old server").await;

    let client_time = server.last_modified + Duration::hours(1);
    let plan = reconcile(
        &app.state,
        &alice,
        vec![entry("a.txt", b"fresh local", client_time)],
    )
    .await
    .unwrap();

    assert_eq!(plan.to_upload, vec!["a.txt".to_string()]);
    assert!(plan.to_download.is_empty());
}

#[tokio::test]
async fn equal_timestamps_favor_the_client() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");
    let server = app.upload(&alice, "a.txt", b"theirs").await;

    let plan = reconcile(
        &app.state,
        &alice,
        vec![entry("a.txt", b"mine", server.last_modified)],
    )
    .await
    .unwrap();

    assert_eq!(plan.to_upload, vec!["a.txt".to_string()]);
    assert!(plan.to_download.is_empty());
}

#[tokio::test]
async fn unknown_names_go_to_upload() {
    let app = TestApp::spawn().await;

    let plan = reconcile(
        &app.state,
        &owner("alice"),
        vec![entry("new.txt", b"brand new", Utc::now())],
    )
    .await
    .unwrap();

    assert_eq!(plan.to_upload, vec!["new.txt".to_string()]);
}

#[tokio::test]
async fn matching_content_needs_no_transfer() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");
    let server = app.upload(&alice, "a.txt", b"in sync").await;

    let plan = reconcile(
        &app.state,
        &alice,
        vec![entry(
            "a.txt",
            b"in sync",
            server.last_modified - Duration::days(3),
        )],
    )
    .await
    .unwrap();

    assert!(plan.is_empty());
}

#[tokio::test]
async fn server_only_files_are_not_reported() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");
    app.upload(&alice, "server-only.txt", b"only here").await;

    let plan = reconcile(&app.state, &alice, Vec::new()).await.unwrap();

    assert!(plan.is_empty());
}

#[tokio::test]
async fn other_owners_files_are_invisible() {
    let app = TestApp::spawn().await;
    let bob_record = app.upload(&owner("bob"), "a.txt", b"bob").await;

    let plan = reconcile(
        &app.state,
        &owner("alice"),
        vec![entry(
            "a.txt",
            b"alice",
            bob_record.last_modified - Duration::hours(1),
        )],
    )
    .await
    .unwrap();

    assert_eq!(plan.to_upload, vec!["a.txt".to_string()]);
    assert!(plan.to_download.is_empty());
}

#[tokio::test]
async fn plan_is_sorted_by_name() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");
    for name in ["d.txt", "c.txt"] {
        app.upload(&alice, name, name.as_bytes()).await;
    }
    let past = Utc::now() - Duration::days(1);

    let plan = reconcile(
        &app.state,
        &alice,
        vec![
            entry("z.txt", b"z", past),
            entry("d.txt", b"local d", past),
            entry("b.txt", b"b", past),
            entry("c.txt", b"local c", past),
        ],
    )
    .await
    .unwrap();

    assert_eq!(plan.to_upload, vec!["b.txt".to_string(), "z.txt".to_string()]);
    let downloads: Vec<&str> = plan.to_download.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(downloads, vec!["c.txt", "d.txt"]);
}

#[tokio::test]
async fn malformed_inventory_is_rejected() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");

    let bad = ClientFileEntry {
        name: "a.txt".into(),
        hash: "not-a-hash".into(),
        last_modified: Utc::now().to_rfc3339(),
    };
    let result = reconcile(&app.state, &alice, vec![bad]).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn inventory_round_trips_through_json() {
    let app = TestApp::spawn().await;
    let alice = owner("alice");
    let hash = ContentHash::compute(b"x").to_hex();

    let raw = format!(
        r#"[{{"name": "a.txt", "hash": "{hash}", "last_modified": "2024-05-01T12:00:00Z"}}]"#
    );
    let entries: Vec<ClientFileEntry> = serde_json::from_str(&raw).unwrap();
    let plan = reconcile(&app.state, &alice, entries).await.unwrap();

    assert_eq!(plan.to_upload, vec!["a.txt".to_string()]);
}
