//! Database handle shared by the counter store and the job queue

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::{DbError, Result};

/// Concurrent writers wait this long on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 8;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // WAL lets the API process enqueue while workers hold read transactions
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections. Subsequent queries fail, which is how tests
    /// simulate an unreachable store.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosspostError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_parent_directories_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("dir").join("test.db");

        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('rate_limits', 'publish_jobs') ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["publish_jobs", "rate_limits"]);
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let first = Database::new(db_path.to_str().unwrap()).await.unwrap();
        first.close().await;
        Database::new(db_path.to_str().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_path_is_database_error() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";
        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        match Database::new(invalid_path).await {
            Err(CrosspostError::Database(_)) => {}
            Err(other) => panic!("Expected database error, got {}", other),
            Ok(_) => panic!("Expected error for invalid path"),
        }
    }

    #[tokio::test]
    async fn test_closed_pool_fails_queries() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();

        db.close().await;
        let result = sqlx::query("SELECT 1").execute(db.pool()).await;
        assert!(result.is_err());
    }
}
