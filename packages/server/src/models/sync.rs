use chrono::{DateTime, Utc};
use common::storage::ContentHash;
use serde::{Deserialize, Serialize};

use super::file::FileRecord;

/// One entry of a client's inventory, exactly as it arrives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientFileEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hash: String,
    /// RFC 3339 timestamp of the client's last local change.
    #[serde(default)]
    pub last_modified: String,
}

/// A validated inventory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFile {
    pub name: String,
    pub hash: ContentHash,
    pub last_modified: DateTime<Utc>,
}

/// Transfer directives for one reconciliation.
///
/// Both lists are sorted by name. Server-side files the client did not
/// mention never appear here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Names the client must push.
    pub to_upload: Vec<String>,
    /// Records the client must pull; content is fetched separately.
    pub to_download: Vec<FileRecord>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty()
    }
}
