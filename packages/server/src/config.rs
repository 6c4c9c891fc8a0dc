use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::StorageConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Registry connection URL. Default: "sqlite://cloudsync.db?mode=rwc".
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Connection pool size. Default: 10.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://cloudsync.db?mode=rwc".into()
}
fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// What to do with a freshly written blob when publishing its registry entry fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave the blob in place for a later garbage-collection sweep.
    #[default]
    Defer,
    /// Delete the blob immediately if this upload created it.
    Rollback,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct UploadConfig {
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CLOUDSYNC_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("database.url", default_database_url())?
            .set_default("database.max_connections", i64::from(default_max_connections()))?
            .set_default("storage.root", "./storage")?
            .set_default("upload.orphan_policy", "defer")?
            // Load from config/config.toml
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g., CLOUDSYNC__STORAGE__ROOT)
            .add_source(Environment::with_prefix("CLOUDSYNC").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
