use crate::cache::CacheStore;
use crate::error::DashboardError;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::fs;
use std::path::Path;

/// Initialize the database: create the file, connect, and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, String> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create data directory: {e}"))?;
    }
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .map_err(|e| format!("Failed to connect to database: {e}"))?;

    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await
        .map_err(|e| format!("Failed to set WAL mode: {e}"))?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// A migrated database that lives only as long as the pool. One connection, since
/// every in-memory connection would otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool, String> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| format!("Failed to open in-memory database: {e}"))?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run migrations by executing SQL files in order.
async fn run_migrations(pool: &SqlitePool) -> Result<(), String> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to create migrations table: {e}"))?;

    let migrations: &[(&str, &str)] = &[("001_initial", include_str!("../migrations/001_initial.sql"))];

    for (name, sql) in migrations {
        let applied: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .map_err(|e| format!("Failed to check migration {name}: {e}"))?;

        if !applied {
            for statement in sql.split(';') {
                let trimmed = statement.trim();
                if !trimmed.is_empty() {
                    sqlx::query(trimmed)
                        .execute(pool)
                        .await
                        .map_err(|e| format!("Migration {name} failed: {e}"))?;
                }
            }

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| format!("Failed to record migration {name}: {e}"))?;

            log::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

/// Cache slots persisted in the `cache_entries` table.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DashboardError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), DashboardError> {
        sqlx::query(
            "INSERT INTO cache_entries (key, value, updated_at) VALUES (?, ?, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DashboardError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, CacheScope};
    use crate::resource::{ResourceEnvelope, ResourceMap};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_memory_database().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_sqlite_store_set_get_delete() {
        let store = SqliteCacheStore::new(init_memory_database().await.unwrap());
        assert!(store.get("dashboard_data").await.unwrap().is_none());

        store.set("dashboard_data", "one".to_string()).await.unwrap();
        store.set("dashboard_data", "two".to_string()).await.unwrap();
        assert_eq!(store.get("dashboard_data").await.unwrap().as_deref(), Some("two"));

        store.delete("dashboard_data").await.unwrap();
        assert!(store.get("dashboard_data").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_manager_over_sqlite() {
        let store = Arc::new(SqliteCacheStore::new(init_memory_database().await.unwrap()));
        let cache = CacheManager::new(store, 30, 30);
        let mut map = ResourceMap::new();
        map.insert("profile".into(), ResourceEnvelope::ok(json!({"name": "Ada"})));

        cache.write(CacheScope::Course(12), &map).await;
        assert_eq!(cache.read(CacheScope::Course(12)).await, Some(map));
        assert_eq!(cache.known_course_ids().await, vec![12]);
    }

    #[tokio::test]
    async fn test_init_database_creates_file() {
        let dir = std::env::temp_dir().join(format!("student-dashboard-test-{}", std::process::id()));
        let path = dir.join("nested").join("dashboard.db");
        let pool = init_database(&path).await.unwrap();
        assert!(path.exists());
        pool.close().await;
        let _ = fs::remove_dir_all(&dir);
    }
}
