use std::time::Duration;

use ::common::storage::ContentHash;
use cloudsync_server::error::AppError;
use cloudsync_server::models::NewFile;

use crate::common::{TestApp, owner};

fn new_file(name: &str, content: &[u8]) -> NewFile {
    NewFile {
        name: name.into(),
        content_hash: ContentHash::compute(content),
        size: content.len() as u64,
        content_type: None,
        parent_id: None,
    }
}

mod writes {
    use super::*;

    #[tokio::test]
    async fn create_then_create_conflicts() {
        let app = TestApp::spawn().await;
        let registry = app.state.registry();
        let alice = owner("alice");

        let first = registry.create(&alice, new_file("a.txt", b"1")).await.unwrap();
        assert_eq!(first.version, 1);

        let second = registry.create(&alice, new_file("a.txt", b"2")).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn replace_without_existing_record_creates_version_one() {
        let app = TestApp::spawn().await;
        let registry = app.state.registry();

        let replaced = registry
            .replace(&owner("alice"), new_file("a.txt", b"1"))
            .await
            .unwrap();

        assert_eq!(replaced.record.version, 1);
        assert_eq!(replaced.record.size, 1);
        assert!(replaced.previous_hash.is_none());
    }

    #[tokio::test]
    async fn replace_overwrites_content_fields() {
        let app = TestApp::spawn().await;
        let registry = app.state.registry();
        let alice = owner("alice");
        let v1 = registry.create(&alice, new_file("a.txt", b"one")).await.unwrap();

        let replaced = registry
            .replace(&alice, new_file("a.txt", b"three"))
            .await
            .unwrap();
        let v2 = replaced.record;

        assert_eq!(v2.id, v1.id);
        assert_eq!(v2.created_at, v1.created_at);
        assert_eq!(v2.version, 2);
        assert_eq!(v2.size, 5);
        assert_eq!(v2.content_hash, ContentHash::compute(b"three").to_hex());
        assert_eq!(replaced.previous_hash, Some(v1.content_hash));
        assert_eq!(registry.get(&alice, "a.txt").await.unwrap(), v2);
    }

    #[tokio::test]
    async fn racing_replaces_each_report_what_they_superseded() {
        let app = TestApp::spawn().await;
        let alice = owner("alice");
        let original = app
            .state
            .registry()
            .create(&alice, new_file("a.txt", b"original"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..6 {
            let state = app.state.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                let body = format!("body {i}");
                state
                    .registry()
                    .replace(&alice, new_file("a.txt", body.as_bytes()))
                    .await
            }));
        }

        let mut written = Vec::new();
        let mut superseded = Vec::new();
        for handle in handles {
            let replaced = handle.await.unwrap().unwrap();
            written.push(replaced.record.content_hash);
            superseded.push(replaced.previous_hash.unwrap());
        }

        // The writes form one chain: every hash is superseded exactly once,
        // except the final one.
        let current = app.state.registry().get(&alice, "a.txt").await.unwrap();
        assert_eq!(current.version, 7);
        written.insert(0, original.content_hash);
        written.retain(|h| *h != current.content_hash);
        written.sort();
        superseded.sort();
        assert_eq!(written, superseded);
    }
}

mod reads {
    use super::*;

    #[tokio::test]
    async fn get_by_id_is_owner_scoped() {
        let app = TestApp::spawn().await;
        let registry = app.state.registry();
        let record = registry
            .create(&owner("alice"), new_file("a.txt", b"x"))
            .await
            .unwrap();

        assert_eq!(
            registry.get_by_id(&owner("alice"), record.id).await.unwrap(),
            record
        );
        assert!(matches!(
            registry.get_by_id(&owner("bob"), record.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let app = TestApp::spawn().await;
        let registry = app.state.registry();
        let alice = owner("alice");

        for name in ["first", "second", "third"] {
            registry.create(&alice, new_file(name, name.as_bytes())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        registry.replace(&alice, new_file("first", b"edited")).await.unwrap();

        let names: Vec<String> = registry
            .list(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();

        assert_eq!(names, vec!["first", "third", "second"]);
    }

    #[tokio::test]
    async fn count_references_counts_per_owner() {
        let app = TestApp::spawn().await;
        let registry = app.state.registry();
        let alice = owner("alice");
        let bob = owner("bob");
        let hash = ContentHash::compute(b"same");

        registry.create(&alice, new_file("a", b"same")).await.unwrap();
        registry.create(&alice, new_file("b", b"same")).await.unwrap();
        registry.create(&bob, new_file("a", b"same")).await.unwrap();
        registry.create(&alice, new_file("c", b"other")).await.unwrap();

        assert_eq!(registry.count_references(&alice, &hash).await.unwrap(), 2);
        assert_eq!(registry.count_references(&bob, &hash).await.unwrap(), 1);
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn delete_returns_the_removed_record() {
        let app = TestApp::spawn().await;
        let registry = app.state.registry();
        let alice = owner("alice");
        let record = registry.create(&alice, new_file("a.txt", b"x")).await.unwrap();

        let removed = registry.delete(&alice, "a.txt").await.unwrap();
        assert_eq!(removed, record);

        assert!(registry.find(&alice, "a.txt").await.unwrap().is_none());
        assert!(matches!(
            registry.delete(&alice, "a.txt").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn racing_deletes_remove_exactly_once() {
        let app = TestApp::spawn().await;
        let alice = owner("alice");
        app.state
            .registry()
            .create(&alice, new_file("a.txt", b"x"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let state = app.state.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                state.registry().delete(&alice, "a.txt").await
            }));
        }

        let mut removed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => removed += 1,
                Err(AppError::NotFound(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(removed, 1);
    }
}
