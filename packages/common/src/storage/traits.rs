use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::hash::ContentHash;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

const MAX_OWNER_LEN: usize = 128;

/// Bytes that have been fully received and hashed but not yet published
/// under their `(owner, hash)` key.
///
/// Dropping a staged blob without calling [`BlobStore::commit`] or
/// [`BlobStore::discard`] leaves the staging copy behind.
#[derive(Debug)]
pub struct StagedBlob {
    pub owner: String,
    pub hash: ContentHash,
    pub size: u64,
    /// Backend-specific handle for the staging copy.
    pub staging_key: String,
}

/// Result of storing a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    pub hash: ContentHash,
    pub size: u64,
    /// `false` when identical content was already stored for the owner.
    pub created: bool,
}

/// Content-addressed blob storage, partitioned by owner.
///
/// Blobs are keyed by `(owner, hash)`. The store keeps no reference counts:
/// callers decide when a blob is no longer needed.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `reader` into a staging area while hashing it.
    ///
    /// Nothing is visible under the content key until [`commit`](Self::commit).
    /// A read error or a size-limit violation removes the staging copy.
    async fn stage(&self, owner: &str, reader: BoxReader) -> Result<StagedBlob, StorageError>;

    /// Publish a staged blob under its `(owner, hash)` key if no blob is
    /// stored there yet. Returns `true` if this call created the blob.
    async fn commit(&self, staged: StagedBlob) -> Result<bool, StorageError>;

    /// Throw away a staged blob.
    async fn discard(&self, staged: StagedBlob) -> Result<(), StorageError>;

    /// Store data from an async reader.
    async fn put_stream(&self, owner: &str, reader: BoxReader) -> Result<PutOutcome, StorageError> {
        let staged = self.stage(owner, reader).await?;
        let (hash, size) = (staged.hash, staged.size);
        let created = self.commit(staged).await?;
        Ok(PutOutcome {
            hash,
            size,
            created,
        })
    }

    /// Store bytes and return the content hash.
    async fn put(&self, owner: &str, data: &[u8]) -> Result<ContentHash, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        Ok(self.put_stream(owner, reader).await?.hash)
    }

    /// Retrieve a blob as a streaming async reader.
    async fn get_stream(&self, owner: &str, hash: &ContentHash)
    -> Result<BoxReader, StorageError>;

    /// Retrieve all bytes for a blob.
    async fn get(&self, owner: &str, hash: &ContentHash) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(owner, hash).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Check whether a blob exists.
    async fn exists(&self, owner: &str, hash: &ContentHash) -> Result<bool, StorageError>;

    /// Delete a blob. Fails with [`StorageError::NotFound`] if it is absent.
    async fn delete(&self, owner: &str, hash: &ContentHash) -> Result<(), StorageError>;

    /// Get the size of a blob in bytes.
    async fn size(&self, owner: &str, hash: &ContentHash) -> Result<u64, StorageError>;
}

/// Check that `owner` is usable as a single storage path segment.
pub fn validate_owner(owner: &str) -> Result<&str, StorageError> {
    if owner.is_empty() {
        return Err(StorageError::InvalidOwner("owner cannot be empty".into()));
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(StorageError::InvalidOwner(format!(
            "owner exceeds {MAX_OWNER_LEN} characters"
        )));
    }
    if owner == "." || owner == ".." {
        return Err(StorageError::InvalidOwner(format!("'{owner}' is reserved")));
    }
    if !owner
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(StorageError::InvalidOwner(
            "allowed characters are a-zA-Z0-9, -, _, .".into(),
        ));
    }
    Ok(owner)
}
