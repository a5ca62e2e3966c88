//! Single-file SQLite backend.
//!
//! One `kv_state` table holding JSON documents as text. Upserts go through
//! `ON CONFLICT` so concurrent writers serialize on the database, and the
//! pool is kept small - checkpoint traffic is one tiny write per active chat
//! per cadence tick.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use super::{StateStore, StorageError};

/// SQLite-backed state store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let url = format!("sqlite:{}", path.display());
        Self::open_url(&url).await
    }

    /// Open from a SQLite connection URL (e.g. `sqlite::memory:`).
    pub async fn open_url(url: &str) -> Result<Self, StorageError> {
        if !sqlx::Sqlite::database_exists(url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(url).await?;
        }

        let pool = SqlitePoolOptions::new().max_connections(2).connect(url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_state (
                key      TEXT PRIMARY KEY,
                value    TEXT NOT NULL,
                saved_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO kv_state (key, value, saved_at)
            VALUES (?, ?, unixepoch())
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError> {
        // The store holds one record per active chat, so fetch-and-filter
        // beats wrestling with LIKE wildcard escaping for prefixes like
        // "state_".
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM kv_state ORDER BY key")
                .fetch_all(&self.pool)
                .await?;

        let mut out = Vec::new();
        for (key, raw) in rows {
            if !key.starts_with(prefix) {
                continue;
            }
            match serde_json::from_str(&raw) {
                Ok(value) => out.push((key, value)),
                Err(e) => {
                    tracing::warn!("Skipping corrupt record {:?} during scan: {}", key, e);
                }
            }
        }
        Ok(out)
    }
}
