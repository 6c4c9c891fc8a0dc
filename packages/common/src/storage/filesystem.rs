use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use super::error::StorageError;
use super::hash::{ContentHash, ContentHasher};
use super::traits::{BlobStore, BoxReader, StagedBlob, validate_owner};

/// Filesystem-backed content-addressed blob store.
///
/// Blobs are stored per owner in a Git-style sharded layout:
/// `{base_path}/objects/{owner}/{first 2 hex chars}/{remaining 62 hex chars}`.
/// Incoming streams are staged under `{base_path}/.tmp` and renamed into place,
/// so a blob path only ever holds complete content.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(base_path.join("objects")).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Compute the filesystem path for a given `(owner, hash)` key.
    fn blob_path(&self, owner: &str, hash: &ContentHash) -> Result<PathBuf, StorageError> {
        let owner = validate_owner(owner)?;
        Ok(self
            .base_path
            .join("objects")
            .join(owner)
            .join(hash.shard_prefix())
            .join(hash.shard_suffix()))
    }

    fn staging_path(&self, staging_key: &str) -> PathBuf {
        self.base_path.join(".tmp").join(staging_key)
    }

    fn not_found(owner: &str, hash: &ContentHash) -> StorageError {
        StorageError::NotFound {
            owner: owner.to_string(),
            hash: hash.to_hex(),
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn stage(&self, owner: &str, mut reader: BoxReader) -> Result<StagedBlob, StorageError> {
        validate_owner(owner)?;

        let staging_key = uuid::Uuid::new_v4().to_string();
        let temp_path = self.staging_path(&staging_key);
        let mut hasher = ContentHasher::new();

        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
        let mut temp_file = fs::File::create(&temp_path).await?;

        let copied: Result<(), StorageError> = async {
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }

                let total = hasher.len() + n as u64;
                if total > self.max_size {
                    return Err(StorageError::SizeLimitExceeded {
                        actual: total,
                        limit: self.max_size,
                    });
                }

                hasher.update(&buf[..n]);
                temp_file.write_all(&buf[..n]).await?;
            }
            temp_file.flush().await?;
            Ok(())
        }
        .await;

        drop(temp_file);
        if let Err(e) = copied {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        let size = hasher.len();
        Ok(StagedBlob {
            owner: owner.to_string(),
            hash: hasher.finalize(),
            size,
            staging_key,
        })
    }

    async fn commit(&self, staged: StagedBlob) -> Result<bool, StorageError> {
        let temp_path = self.staging_path(&staged.staging_key);
        let blob_path = self.blob_path(&staged.owner, &staged.hash)?;

        if fs::try_exists(&blob_path).await? {
            debug!(owner = %staged.owner, content_hash = %staged.hash, "blob already stored");
            let _ = fs::remove_file(&temp_path).await;
            return Ok(false);
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Identical bytes may be renamed over a blob written concurrently.
        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(true)
    }

    async fn discard(&self, staged: StagedBlob) -> Result<(), StorageError> {
        match fs::remove_file(self.staging_path(&staged.staging_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_stream(
        &self,
        owner: &str,
        hash: &ContentHash,
    ) -> Result<BoxReader, StorageError> {
        let blob_path = self.blob_path(owner, hash)?;
        match fs::File::open(&blob_path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Self::not_found(owner, hash))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, owner: &str, hash: &ContentHash) -> Result<bool, StorageError> {
        let blob_path = self.blob_path(owner, hash)?;
        Ok(fs::try_exists(&blob_path).await?)
    }

    async fn delete(&self, owner: &str, hash: &ContentHash) -> Result<(), StorageError> {
        let blob_path = self.blob_path(owner, hash)?;
        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Self::not_found(owner, hash))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, owner: &str, hash: &ContentHash) -> Result<u64, StorageError> {
        let blob_path = self.blob_path(owner, hash)?;
        match fs::metadata(&blob_path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Self::not_found(owner, hash))
            }
            Err(e) => Err(e.into()),
        }
    }
}
