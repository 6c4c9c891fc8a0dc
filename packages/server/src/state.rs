use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use anyhow::Context;
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::{BlobStore, ContentHash};
use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::AppConfig;
use crate::database::init_db;
use crate::models::Owner;
use crate::registry::FileRegistry;

const LOCK_STRIPES: usize = 64;

/// Striped locks over `(owner, hash)` blob keys.
///
/// Held while a blob's fate is decided together with the registry: by the
/// upload pipeline from commit until its record is written (or rolled back),
/// and by the deletion pipeline from the reference count until the blob is
/// gone. Unrelated keys may share a stripe.
#[derive(Clone)]
pub struct BlobLocks {
    stripes: Arc<[Mutex<()>]>,
}

impl BlobLocks {
    pub fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub async fn lock(&self, owner: &Owner, hash: &ContentHash) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        owner.hash(&mut hasher);
        hash.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}

impl Default for BlobLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blob_store: Arc<dyn BlobStore>,
    pub config: Arc<AppConfig>,
    pub locks: BlobLocks,
}

impl AppState {
    pub fn new(db: DatabaseConnection, blob_store: Arc<dyn BlobStore>, config: AppConfig) -> Self {
        Self {
            db,
            blob_store,
            config: Arc::new(config),
            locks: BlobLocks::new(),
        }
    }

    /// Connect the registry and open the filesystem blob store.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let db = init_db(&config.database)
            .await
            .context("Failed to initialize registry database")?;

        let blob_store =
            FilesystemBlobStore::new(config.storage.root.clone(), config.storage.max_blob_size)
                .await
                .with_context(|| {
                    format!(
                        "Failed to open blob store at {}",
                        config.storage.root.display()
                    )
                })?;

        Ok(Self::new(db, Arc::new(blob_store), config))
    }

    pub fn registry(&self) -> FileRegistry<'_, DatabaseConnection> {
        FileRegistry::new(&self.db)
    }
}
