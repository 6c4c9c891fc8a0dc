use std::time::Duration;

use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder, SqliteQueryBuilder};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::entity::file_record;

/// Connect to the registry database, sync the schema and ensure indexes.
pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.to_owned());

    // Set connection pool options
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("cloudsync_server::entity::*")
        .sync(&db)
        .await?;

    ensure_indexes(&db).await?;

    Ok(db)
}

/// Ensure required registry indexes exist.
///
/// The `(owner_id, name)` index is unique: it is what keeps two live records
/// from sharing a name, and it is the conflict target of the upsert in
/// `FileRegistry::replace`. The other two are plain lookup indexes, so failing
/// to create them only costs performance.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let unique = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_file_record_owner_name")
        .table(file_record::Entity)
        .col(file_record::Column::OwnerId)
        .col(file_record::Column::Name)
        .to_owned();
    db.execute_unprepared(&build(db, &unique)).await?;
    info!("Ensured index idx_file_record_owner_name exists");

    // SELECT COUNT(*) FROM file_record WHERE owner_id = ? AND content_hash = ?
    let refs = Index::create()
        .if_not_exists()
        .name("idx_file_record_owner_hash")
        .table(file_record::Entity)
        .col(file_record::Column::OwnerId)
        .col(file_record::Column::ContentHash)
        .to_owned();

    // SELECT * FROM file_record WHERE owner_id = ? ORDER BY last_modified DESC
    let recent = Index::create()
        .if_not_exists()
        .name("idx_file_record_owner_modified")
        .table(file_record::Entity)
        .col(file_record::Column::OwnerId)
        .col(file_record::Column::LastModified)
        .to_owned();

    for (name, stmt) in [
        ("idx_file_record_owner_hash", refs),
        ("idx_file_record_owner_modified", recent),
    ] {
        match db.execute_unprepared(&build(db, &stmt)).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => warn!("Failed to create index {}: {}", name, e),
        }
    }

    Ok(())
}

fn build(db: &DatabaseConnection, stmt: &IndexCreateStatement) -> String {
    match db.get_database_backend() {
        DbBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
        _ => stmt.to_string(SqliteQueryBuilder),
    }
}
