use common::storage::{BoxReader, ContentHash};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::OrphanPolicy;
use crate::error::AppError;
use crate::models::{FileDownload, FileListResponse, FileRecord, NewFile, Owner, UploadRequest};
use crate::state::AppState;
use crate::utils::filename::validate_logical_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Create,
    Replace,
}

/// Store `reader` under `request.name`, overwriting any existing file.
///
/// Identical content already stored for the owner is not written again.
#[instrument(skip(state, request, reader), fields(owner = %owner, name = %request.name))]
pub async fn upload_file(
    state: &AppState,
    owner: &Owner,
    request: UploadRequest,
    reader: BoxReader,
) -> Result<FileRecord, AppError> {
    store_file(state, owner, request, reader, WriteMode::Replace).await
}

/// Like [`upload_file`], but fails with `Conflict` if the name is taken.
#[instrument(skip(state, request, reader), fields(owner = %owner, name = %request.name))]
pub async fn create_file(
    state: &AppState,
    owner: &Owner,
    request: UploadRequest,
    reader: BoxReader,
) -> Result<FileRecord, AppError> {
    store_file(state, owner, request, reader, WriteMode::Create).await
}

async fn store_file(
    state: &AppState,
    owner: &Owner,
    request: UploadRequest,
    reader: BoxReader,
    mode: WriteMode,
) -> Result<FileRecord, AppError> {
    let name = validate_logical_name(&request.name)
        .map_err(|e| AppError::Validation(e.message().into()))?
        .to_string();

    let registry = state.registry();

    if let Some(parent_id) = request.parent_id {
        registry
            .get_by_id(owner, parent_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::NotFound(format!("Parent {parent_id} not found"))
                }
                other => other,
            })?;
    }

    if mode == WriteMode::Create && registry.find(owner, &name).await?.is_some() {
        return Err(AppError::Conflict(format!("File '{name}' already exists")));
    }

    // A failed or cancelled stream stops here, before anything is published.
    let staged = state.blob_store.stage(owner.as_str(), reader).await?;
    let (hash, size) = (staged.hash, staged.size);

    if let Some(declared) = request.declared_size
        && declared != size
    {
        debug!(declared, actual = size, "Declared size differs from received bytes");
    }

    let content_type = mime_guess::from_path(&name)
        .first()
        .map(|m| m.to_string());

    let file = NewFile {
        name,
        content_hash: hash,
        size,
        content_type,
        parent_id: request.parent_id,
    };

    let guard = state.locks.lock(owner, &hash).await;

    let created = match state.blob_store.commit(staged).await {
        Ok(created) => created,
        Err(e) => {
            warn!(error = %e, "Failed to commit staged blob");
            return Err(e.into());
        }
    };

    let written = match mode {
        WriteMode::Create => registry.create(owner, file).await.map(|record| (record, None)),
        WriteMode::Replace => registry
            .replace(owner, file)
            .await
            .map(|replaced| (replaced.record, replaced.previous_hash)),
    };

    let (record, previous_hash) = match written {
        Ok(written) => written,
        Err(e) => {
            handle_orphan(state, owner, &hash, created).await;
            return Err(e);
        }
    };
    // Never held while locking the superseded hash.
    drop(guard);

    info!(
        id = %record.id,
        hash = %record.content_hash,
        size = record.size,
        deduplicated = !created,
        version = record.version,
        "File stored"
    );

    if let Some(previous) = previous_hash
        && previous != record.content_hash
    {
        match ContentHash::from_hex(&previous) {
            Ok(previous) => release_blob(state, owner, &previous).await,
            Err(e) => warn!(hash = %previous, error = %e, "Superseded hash is corrupt, blob kept"),
        }
    }

    Ok(record)
}

/// Deal with a blob whose registry entry could not be written.
///
/// Only a blob this upload created is touched. A pre-existing blob still has
/// whatever records pointed at it before.
async fn handle_orphan(state: &AppState, owner: &Owner, hash: &ContentHash, created: bool) {
    if !created {
        return;
    }

    match state.config.upload.orphan_policy {
        OrphanPolicy::Defer => {
            warn!(hash = %hash, "Registry write failed, blob left for garbage collection");
        }
        OrphanPolicy::Rollback => match state.blob_store.delete(owner.as_str(), hash).await {
            Ok(()) => warn!(hash = %hash, "Registry write failed, blob rolled back"),
            Err(e) => warn!(hash = %hash, error = %e, "Registry write failed and rollback failed"),
        },
    }
}

#[instrument(skip(state), fields(owner = %owner))]
pub async fn list_files(state: &AppState, owner: &Owner) -> Result<FileListResponse, AppError> {
    let files = state.registry().list(owner).await?;
    let total = files.len() as u64;
    Ok(FileListResponse { files, total })
}

pub async fn get_file(state: &AppState, owner: &Owner, name: &str) -> Result<FileRecord, AppError> {
    state.registry().get(owner, name).await
}

pub async fn get_file_by_id(
    state: &AppState,
    owner: &Owner,
    id: Uuid,
) -> Result<FileRecord, AppError> {
    state.registry().get_by_id(owner, id).await
}

/// Open the content of a file by record id.
#[instrument(skip(state), fields(owner = %owner))]
pub async fn download_file(
    state: &AppState,
    owner: &Owner,
    id: Uuid,
) -> Result<FileDownload, AppError> {
    let record = state.registry().get_by_id(owner, id).await?;
    open_record(state, owner, record).await
}

/// Open the content of a file by logical name.
#[instrument(skip(state), fields(owner = %owner))]
pub async fn open_file(
    state: &AppState,
    owner: &Owner,
    name: &str,
) -> Result<FileDownload, AppError> {
    let record = state.registry().get(owner, name).await?;
    open_record(state, owner, record).await
}

async fn open_record(
    state: &AppState,
    owner: &Owner,
    record: FileRecord,
) -> Result<FileDownload, AppError> {
    let hash = stored_hash(&record)?;
    let reader = state.blob_store.get_stream(owner.as_str(), &hash).await?;
    Ok(FileDownload { record, reader })
}

/// Remove a file and, once nothing references its content, the blob.
///
/// The removed record is returned. Blob cleanup failures are logged and never
/// undo the logical delete.
#[instrument(skip(state), fields(owner = %owner))]
pub async fn delete_file(
    state: &AppState,
    owner: &Owner,
    name: &str,
) -> Result<FileRecord, AppError> {
    let removed = state.registry().delete(owner, name).await?;
    let hash = stored_hash(&removed)?;

    release_blob(state, owner, &hash).await;

    Ok(removed)
}

/// Delete the blob for `hash` once no record of `owner` references it.
///
/// Failures are logged and otherwise ignored.
async fn release_blob(state: &AppState, owner: &Owner, hash: &ContentHash) {
    let _guard = state.locks.lock(owner, hash).await;

    let remaining = match state.registry().count_references(owner, hash).await {
        Ok(n) => n,
        Err(e) => {
            warn!(hash = %hash, error = %e, "Failed to count references, blob kept");
            return;
        }
    };

    if remaining > 0 {
        debug!(hash = %hash, remaining, "Blob still referenced");
        return;
    }

    match state.blob_store.delete(owner.as_str(), hash).await {
        Ok(()) => info!(hash = %hash, "Blob removed"),
        Err(e) => warn!(hash = %hash, error = %e, "Failed to remove unreferenced blob"),
    }
}

fn stored_hash(record: &FileRecord) -> Result<ContentHash, AppError> {
    ContentHash::from_hex(&record.content_hash).map_err(|e| {
        AppError::Internal(format!("Record {} has a corrupt hash: {e}", record.id))
    })
}
