use chrono::Utc;
use common::storage::ContentHash;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entity::file_record;
use crate::error::AppError;
use crate::models::{FileRecord, NewFile, Owner};

/// How often a version-checked write re-reads a record that a concurrent
/// write bumped.
const WRITE_ATTEMPTS: usize = 16;

/// Outcome of [`FileRegistry::replace`].
#[derive(Debug)]
pub struct Replaced {
    pub record: FileRecord,
    /// Hash the record pointed at before this write. `None` for a new name.
    pub previous_hash: Option<String>,
}

/// The authoritative `(owner, name) -> content` mapping.
///
/// Name uniqueness is enforced by the `(owner_id, name)` unique index and
/// overwrites are version-checked, so every write here is safe to race
/// against any other.
pub struct FileRegistry<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> FileRegistry<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a new record. Fails with `Conflict` if the name is taken.
    #[instrument(skip(self, file), fields(owner = %owner, name = %file.name))]
    pub async fn create(&self, owner: &Owner, file: NewFile) -> Result<FileRecord, AppError> {
        let now = Utc::now();
        let name = file.name.clone();
        let model = file_record::ActiveModel {
            id: Set(Uuid::now_v7()),
            owner_id: Set(owner.to_string()),
            name: Set(file.name),
            content_hash: Set(file.content_hash.to_hex()),
            size: Set(to_db_size(file.size)?),
            content_type: Set(file.content_type),
            parent_id: Set(file.parent_id),
            is_dir: Set(false),
            version: Set(1),
            last_modified: Set(now),
            created_at: Set(now),
        };

        match model.insert(self.conn).await {
            Ok(inserted) => Ok(inserted.into()),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Err(
                AppError::Conflict(format!("File '{name}' already exists")),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or overwrite the record for `file.name`.
    ///
    /// An existing record keeps its id and creation time; its content fields
    /// are overwritten and its version goes up by one. The parent is only
    /// changed when one is given. The update is conditional on the version
    /// that was read, so the returned previous hash is exactly the content
    /// this write superseded.
    #[instrument(skip(self, file), fields(owner = %owner, name = %file.name))]
    pub async fn replace(&self, owner: &Owner, file: NewFile) -> Result<Replaced, AppError> {
        for attempt in 1..=WRITE_ATTEMPTS {
            let Some(current) = self.find(owner, &file.name).await? else {
                match self.create(owner, file.clone()).await {
                    Ok(record) => {
                        return Ok(Replaced {
                            record,
                            previous_hash: None,
                        });
                    }
                    Err(AppError::Conflict(_)) => {
                        warn!(attempt, "Record appeared during replace, retrying");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            let mut update = file_record::Entity::update_many()
                .col_expr(
                    file_record::Column::ContentHash,
                    Expr::value(file.content_hash.to_hex()),
                )
                .col_expr(file_record::Column::Size, Expr::value(to_db_size(file.size)?))
                .col_expr(
                    file_record::Column::ContentType,
                    Expr::value(file.content_type.clone()),
                )
                .col_expr(file_record::Column::LastModified, Expr::value(Utc::now()))
                .col_expr(
                    file_record::Column::Version,
                    Expr::value(to_db_version(current.version.saturating_add(1))),
                );
            if let Some(parent_id) = file.parent_id {
                update = update.col_expr(file_record::Column::ParentId, Expr::value(parent_id));
            }

            let written = update
                .filter(file_record::Column::Id.eq(current.id))
                .filter(file_record::Column::Version.eq(to_db_version(current.version)))
                .exec_with_returning(self.conn)
                .await?;

            if let Some(saved) = written.into_iter().next() {
                let record = FileRecord::from(saved);
                debug!(version = record.version, "Registry entry written");
                return Ok(Replaced {
                    record,
                    previous_hash: Some(current.content_hash),
                });
            }
            warn!(attempt, "Record changed during replace, retrying");
        }

        Err(AppError::Conflict(format!(
            "File '{}' kept changing during replace",
            file.name
        )))
    }

    /// Look up a live record by name.
    pub async fn find(&self, owner: &Owner, name: &str) -> Result<Option<FileRecord>, AppError> {
        let model = file_record::Entity::find()
            .filter(file_record::Column::OwnerId.eq(owner.as_str()))
            .filter(file_record::Column::Name.eq(name))
            .one(self.conn)
            .await?;
        Ok(model.map(FileRecord::from))
    }

    pub async fn get(&self, owner: &Owner, name: &str) -> Result<FileRecord, AppError> {
        self.find(owner, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File '{name}' not found")))
    }

    /// Look up a record by id. Records of other owners are reported as absent.
    pub async fn get_by_id(&self, owner: &Owner, id: Uuid) -> Result<FileRecord, AppError> {
        file_record::Entity::find_by_id(id)
            .filter(file_record::Column::OwnerId.eq(owner.as_str()))
            .one(self.conn)
            .await?
            .map(FileRecord::from)
            .ok_or_else(|| AppError::NotFound("File not found".into()))
    }

    /// All live records of an owner, most recently modified first.
    pub async fn list(&self, owner: &Owner) -> Result<Vec<FileRecord>, AppError> {
        let models = file_record::Entity::find()
            .filter(file_record::Column::OwnerId.eq(owner.as_str()))
            .order_by_desc(file_record::Column::LastModified)
            .order_by_asc(file_record::Column::Name)
            .all(self.conn)
            .await?;
        Ok(models.into_iter().map(FileRecord::from).collect())
    }

    /// Remove the record for `name` and return it.
    ///
    /// Only the row version that was read is deleted, so the returned hash is
    /// never one that a concurrent `replace` already superseded.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn delete(&self, owner: &Owner, name: &str) -> Result<FileRecord, AppError> {
        for attempt in 1..=WRITE_ATTEMPTS {
            let current = self.get(owner, name).await?;

            let result = file_record::Entity::delete_many()
                .filter(file_record::Column::Id.eq(current.id))
                .filter(file_record::Column::Version.eq(to_db_version(current.version)))
                .exec(self.conn)
                .await?;

            if result.rows_affected > 0 {
                return Ok(current);
            }
            warn!(attempt, "Record changed during delete, retrying");
        }

        Err(AppError::Conflict(format!(
            "File '{name}' kept changing during delete"
        )))
    }

    /// Number of live records of `owner` that point at `hash`.
    pub async fn count_references(
        &self,
        owner: &Owner,
        hash: &ContentHash,
    ) -> Result<u64, AppError> {
        let count = file_record::Entity::find()
            .filter(file_record::Column::OwnerId.eq(owner.as_str()))
            .filter(file_record::Column::ContentHash.eq(hash.to_hex()))
            .count(self.conn)
            .await?;
        Ok(count)
    }
}

fn to_db_size(size: u64) -> Result<i64, AppError> {
    i64::try_from(size).map_err(|_| AppError::Validation(format!("Size {size} is too large")))
}

fn to_db_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}
