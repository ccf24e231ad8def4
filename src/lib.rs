pub mod aggregator;
pub mod announcements;
pub mod cache;
pub mod commands;
pub mod config;
pub mod course_names;
pub mod dashboard;
pub mod database;
pub mod error;
pub mod format;
pub mod grading;
pub mod lms;
pub mod payload;
pub mod resource;
pub mod types;

use std::sync::Arc;

pub use commands::AppState;
pub use config::Config;
pub use error::DashboardError;

pub async fn init(config: Config) -> Result<AppState, String> {
    let pool = database::init_database(&config.db_path).await?;
    log::info!("Database initialized at {}", config.db_path.display());
    let store = Arc::new(database::SqliteCacheStore::new(pool.clone()));
    AppState::new(config, pool, store).map_err(|e| format!("Failed to build app state: {e}"))
}
