//! Local directory helpers: inventory scanning and safe file materialization.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use cloudsync_server::models::ClientFileEntry;
use cloudsync_server::utils::filename::validate_logical_name;
use common::storage::{BoxReader, ContentHasher};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of in-progress download files. Scans skip them.
const PARTIAL_PREFIX: &str = ".cloudsync-partial-";

/// Build an inventory from the regular files directly inside `dir`.
///
/// Subdirectories and names that cannot be stored are skipped.
pub async fn scan_dir(dir: &Path) -> anyhow::Result<Vec<ClientFileEntry>> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    while let Some(entry) = read_dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if name.starts_with(PARTIAL_PREFIX) {
            continue;
        }
        if let Err(e) = validate_logical_name(&name) {
            warn!(name = %name, reason = e.message(), "Skipping file");
            continue;
        }

        let hash = hash_file(&entry.path()).await?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        entries.push(ClientFileEntry {
            name,
            hash,
            last_modified: DateTime::<Utc>::from(modified)
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = entries.len(), dir = %dir.display(), "Scanned directory");
    Ok(entries)
}

/// Read an inventory from a JSON file.
pub async fn load_inventory(path: &Path) -> anyhow::Result<Vec<ClientFileEntry>> {
    let raw = fs::read(path)
        .await
        .with_context(|| format!("Failed to read inventory {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to parse inventory {}", path.display()))
}

async fn hash_file(path: &Path) -> anyhow::Result<String> {
    let mut file = fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex())
}

/// Resolve the local path for a logical name inside `dir`.
pub fn local_path(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    if let Err(e) = validate_logical_name(name) {
        bail!("Refusing to write '{name}': {}", e.message());
    }
    Ok(dir.join(name))
}

/// Stream `reader` into `dir/name`, replacing any existing file only once
/// the content is complete.
pub async fn write_file(dir: &Path, name: &str, mut reader: BoxReader) -> anyhow::Result<u64> {
    let target = local_path(dir, name)?;
    let partial = dir.join(format!("{PARTIAL_PREFIX}{}", std::process::id()));

    let result = async {
        let mut file = fs::File::create(&partial).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&partial, &target).await?;
        Ok::<u64, std::io::Error>(written)
    }
    .await;

    match result {
        Ok(written) => Ok(written),
        Err(e) => {
            let _ = fs::remove_file(&partial).await;
            Err(e).with_context(|| format!("Failed to write {}", target.display()))
        }
    }
}
