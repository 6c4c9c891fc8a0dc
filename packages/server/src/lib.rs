pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod state;
pub mod utils;

pub use config::AppConfig;
pub use error::AppError;
pub use state::AppState;
