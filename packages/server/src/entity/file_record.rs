use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_record")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owner partition (canonical string form).
    #[sea_orm(unique_key = "owner_name")]
    pub owner_id: String,

    /// Logical file name, unique within the owner's namespace.
    #[sea_orm(unique_key = "owner_name")]
    pub name: String,

    /// Lowercase hex SHA-256 of the referenced blob.
    pub content_hash: String,

    /// Byte length of the referenced blob.
    pub size: i64,

    /// MIME content type guessed from the name.
    pub content_type: Option<String>,

    pub parent_id: Option<Uuid>,

    pub is_dir: bool,

    /// Starts at 1 and is bumped on every content write.
    pub version: i64,

    /// Server-side write time, used to order conflicting edits.
    pub last_modified: DateTimeUtc,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
