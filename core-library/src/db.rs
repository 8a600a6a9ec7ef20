//! SQLite pool for the local tracking store (`<data_dir>/local.db`).
//!
//! Pools are opened in WAL mode with foreign keys on, and the embedded
//! migrations are applied before the pool is handed out. Tests use
//! [`create_test_pool`], which opens a single-connection in-memory database.

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the store lives and how many connections it may hold.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` opens an in-memory database
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Connections are closed after sitting idle this long
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(15),
            idle_timeout: Some(Duration::from_secs(300)),
        }
    }

    /// Every SQLite connection opens its own in-memory database, so the pool
    /// keeps exactly one connection alive.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(15),
            idle_timeout: None,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            None => SqliteConnectOptions::new().in_memory(true),
        };
        options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.acquire_timeout)
    }

    fn describe(&self) -> String {
        self.path
            .as_deref()
            .map(Path::display)
            .map(|p| p.to_string())
            .unwrap_or_else(|| ":memory:".to_string())
    }
}

/// Open the pool, apply migrations and make sure a query goes through.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database = %config.describe(),
        max_connections = config.max_connections,
        "Opening local store"
    );

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);
    if config.path.is_none() {
        pool_options = pool_options.min_connections(1).max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open local store");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| LibraryError::Migration(e.to_string()))?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    debug!("Local store ready");

    Ok(pool)
}

/// In-memory pool with migrations applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_pool_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        pool.close().await;

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();

        let (enabled,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_config_clamps_connections() {
        let config = DatabaseConfig::new("/data/local.db").max_connections(0);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.describe(), "/data/local.db");
        assert_eq!(DatabaseConfig::in_memory().describe(), ":memory:");
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in [
            "settings",
            "tracked_media",
            "anime_snapshots",
            "manga_snapshots",
            "local_collections",
            "simulated_collections",
        ] {
            let (count,): (i32,) =
                sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap();

            assert_eq!(count, 1, "{table} table should exist");
        }
    }
}
