use std::path::PathBuf;

use serde::Deserialize;

/// Blob storage configuration shared by the service and its tooling.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory that holds blob objects and staging files. Default: "./storage".
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Largest accepted blob in bytes. Default: 1 GiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}
fn default_max_blob_size() -> u64 {
    1024 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_blob_size: default_max_blob_size(),
        }
    }
}
