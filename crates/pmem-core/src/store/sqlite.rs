//! SQLite store (embedded, single connection)

use super::KvStore;
use crate::config::MemoryConfig;
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &MemoryConfig) -> Result<Self> {
        let database_path = &config.database_path;
        tracing::info!("Opening SQLite database at: {}", database_path.display());

        if config.create_dirs {
            if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tracing::debug!("Creating parent directory: {}", parent.display());
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout());

        // One connection: the worker and direct loads share a single session.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        tracing::info!("SQLite connection established");

        Ok(Self { pool })
    }

    /// Open with defaults at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&MemoryConfig::at(path.as_ref())).await
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value FROM memory WHERE key = ?1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO memory (key, value)
            VALUES (?1, ?2)
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM memory WHERE key = ?1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("SQLite connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PmemError;

    #[tokio::test]
    async fn test_basic_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("kv.db")).await.unwrap();
        store.init_schema().await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);

        store.put("k", "1").await.unwrap();
        store.put("k", "2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("2".to_string()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Deleting an absent key is a no-op
        store.delete("k").await.unwrap();
        store.close().await;
    }

    #[tokio::test]
    async fn test_schema_is_idempotent_and_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kv.db");

        let store = SqliteStore::open(&path).await.unwrap();
        store.init_schema().await.unwrap();
        store.init_schema().await.unwrap();
        store.put("persistent_key", "\"persistent_value\"").await.unwrap();
        store.close().await;

        let reopened = SqliteStore::open(&path).await.unwrap();
        reopened.init_schema().await.unwrap();
        assert_eq!(
            reopened.get("persistent_key").await.unwrap().as_deref(),
            Some("\"persistent_value\"")
        );
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_closed_store_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("kv.db")).await.unwrap();
        store.init_schema().await.unwrap();
        store.close().await;

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, PmemError::Storage(_)));
    }
}
