use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ::common::storage::filesystem::FilesystemBlobStore;
use ::common::storage::{BlobStore, BoxReader, ContentHash};
use bytes::Bytes;
use cloudsync_server::config::{
    AppConfig, DatabaseConfig, OrphanPolicy, StorageConfig, UploadConfig,
};
use cloudsync_server::error::AppError;
use cloudsync_server::handlers::file;
use cloudsync_server::models::{FileRecord, Owner, UploadRequest};
use cloudsync_server::state::AppState;
use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// A fresh registry database and blob root in a temporary directory.
pub struct TestApp {
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with a customized configuration.
    pub async fn spawn_with(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = test_config(dir.path());
        customize(&mut config);

        let state = AppState::from_config(config)
            .await
            .expect("Failed to build app state");

        Self { state, dir }
    }

    /// Run against an arbitrary connection (e.g. a `MockDatabase`) with a
    /// real filesystem blob store.
    pub async fn with_db(db: DatabaseConnection, orphan_policy: OrphanPolicy) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = test_config(dir.path());
        config.upload.orphan_policy = orphan_policy;

        let store = FilesystemBlobStore::new(
            config.storage.root.clone(),
            config.storage.max_blob_size,
        )
        .await
        .expect("Failed to open blob store");

        Self {
            state: AppState::new(db, Arc::new(store), config),
            dir,
        }
    }

    pub fn store(&self) -> &dyn BlobStore {
        &*self.state.blob_store
    }

    pub async fn upload(&self, owner: &Owner, name: &str, data: &[u8]) -> FileRecord {
        self.try_upload(owner, name, data)
            .await
            .expect("upload should succeed")
    }

    pub async fn try_upload(
        &self,
        owner: &Owner,
        name: &str,
        data: &[u8],
    ) -> Result<FileRecord, AppError> {
        file::upload_file(&self.state, owner, UploadRequest::new(name), reader(data)).await
    }

    /// Download a file by name and collect its bytes.
    pub async fn read(&self, owner: &Owner, name: &str) -> Vec<u8> {
        let mut download = file::open_file(&self.state, owner, name)
            .await
            .expect("open should succeed");
        let mut buf = Vec::new();
        download
            .reader
            .read_to_end(&mut buf)
            .await
            .expect("read should succeed");
        buf
    }

    pub async fn blob_exists(&self, owner: &Owner, data: &[u8]) -> bool {
        self.store()
            .exists(owner.as_str(), &ContentHash::compute(data))
            .await
            .expect("exists should succeed")
    }

    /// Number of blob files stored for `owner`.
    pub fn blob_count(&self, owner: &Owner) -> usize {
        count_files(&self.dir.path().join("blobs/objects").join(owner.as_str()))
    }

    pub fn staging_count(&self) -> usize {
        count_files(&self.dir.path().join("blobs/.tmp"))
    }
}

fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", root.join("registry.db").display()),
            max_connections: 5,
        },
        storage: StorageConfig {
            root: root.join("blobs"),
            max_blob_size: 1024 * 1024,
        },
        upload: UploadConfig::default(),
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

pub fn owner(raw: &str) -> Owner {
    Owner::parse(raw).expect("valid owner")
}

pub fn reader(data: &[u8]) -> BoxReader {
    Box::new(Cursor::new(data.to_vec()))
}

/// A reader that yields `prefix` and then fails, like a dropped connection.
pub fn broken_reader(prefix: &'static [u8]) -> BoxReader {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(prefix)),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client went away",
        )),
    ];
    Box::new(StreamReader::new(futures::stream::iter(chunks)))
}
