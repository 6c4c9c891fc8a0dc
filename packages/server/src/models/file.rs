use chrono::{DateTime, Utc};
use common::storage::{BoxReader, ContentHash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::file_record;

/// A logical, named file as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Record ID (UUIDv7).
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    /// Lowercase hex SHA-256 of the content.
    pub content_hash: String,
    /// Content size in bytes.
    pub size: u64,
    pub content_type: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_dir: bool,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<file_record::Model> for FileRecord {
    fn from(model: file_record::Model) -> Self {
        Self {
            id: model.id,
            owner: model.owner_id,
            name: model.name,
            content_hash: model.content_hash,
            size: u64::try_from(model.size).unwrap_or_default(),
            content_type: model.content_type,
            parent_id: model.parent_id,
            is_dir: model.is_dir,
            version: u64::try_from(model.version).unwrap_or_default(),
            last_modified: model.last_modified,
            created_at: model.created_at,
        }
    }
}

/// Values written into the registry for one logical file.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub content_hash: ContentHash,
    pub size: u64,
    pub content_type: Option<String>,
    pub parent_id: Option<Uuid>,
}

/// Caller-supplied description of an upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadRequest {
    pub name: String,
    /// Advisory. The size of the received bytes is what gets recorded.
    #[serde(default)]
    pub declared_size: Option<u64>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl UploadRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    /// Most recently modified first.
    pub files: Vec<FileRecord>,
    pub total: u64,
}

/// An opened file: its record plus a reader over the blob.
pub struct FileDownload {
    pub record: FileRecord,
    pub reader: BoxReader,
}
