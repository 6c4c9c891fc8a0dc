use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::storage::ContentHash;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{ClientFile, ClientFileEntry, FileRecord, Owner, ReconcilePlan};
use crate::state::AppState;
use crate::utils::filename::validate_logical_name;

/// What to do with one file the client declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    InSync,
    Upload,
    Download,
}

/// Decide the transfer direction for a single file.
///
/// The server copy wins only when its content differs and it is strictly
/// newer than the client's. Equal timestamps go to the client.
pub fn decide(client: &ClientFile, server: Option<&FileRecord>) -> SyncAction {
    let Some(server) = server else {
        return SyncAction::Upload;
    };

    if server.content_hash.eq_ignore_ascii_case(&client.hash.to_hex()) {
        return SyncAction::InSync;
    }

    if server.last_modified > client.last_modified {
        SyncAction::Download
    } else {
        SyncAction::Upload
    }
}

/// Check a raw inventory and convert it, sorted by name.
pub fn validate_inventory(entries: Vec<ClientFileEntry>) -> Result<Vec<ClientFile>, AppError> {
    let mut seen = HashSet::with_capacity(entries.len());
    let mut files = Vec::with_capacity(entries.len());

    for entry in entries {
        validate_logical_name(&entry.name).map_err(|e| {
            AppError::Validation(format!("Inventory entry {:?}: {}", entry.name, e.message()))
        })?;

        if !seen.insert(entry.name.clone()) {
            return Err(AppError::Validation(format!(
                "Inventory lists '{}' more than once",
                entry.name
            )));
        }

        let hash = ContentHash::from_hex(&entry.hash).map_err(|e| {
            AppError::Validation(format!("Inventory entry '{}': {e}", entry.name))
        })?;

        let last_modified = DateTime::parse_from_rfc3339(&entry.last_modified)
            .map_err(|e| {
                AppError::Validation(format!(
                    "Inventory entry '{}': invalid timestamp {:?}: {e}",
                    entry.name, entry.last_modified
                ))
            })?
            .with_timezone(&Utc);

        files.push(ClientFile {
            name: entry.name,
            hash,
            last_modified,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Diff a client inventory against the registry.
///
/// Only names the client declares are considered; files that exist only on
/// the server are not reported.
#[instrument(skip(state, entries), fields(owner = %owner, entries = entries.len()))]
pub async fn reconcile(
    state: &AppState,
    owner: &Owner,
    entries: Vec<ClientFileEntry>,
) -> Result<ReconcilePlan, AppError> {
    let files = validate_inventory(entries)?;
    let registry = state.registry();
    let mut plan = ReconcilePlan::default();

    for file in files {
        let server = registry.find(owner, &file.name).await?;
        match decide(&file, server.as_ref()) {
            SyncAction::InSync => {}
            SyncAction::Upload => plan.to_upload.push(file.name),
            SyncAction::Download => {
                if let Some(record) = server {
                    plan.to_download.push(record);
                }
            }
        }
    }

    info!(
        to_upload = plan.to_upload.len(),
        to_download = plan.to_download.len(),
        "Reconciled inventory"
    );
    Ok(plan)
}
