//! Key/value persistence for playback checkpoints.
//!
//! Values are opaque JSON documents; keys are flat strings (the engine uses
//! `state_<chat_id>`). The [`StateStore`] trait keeps callers independent of
//! the backend: the default is a single-file SQLite store, with an in-memory
//! store for tests and ephemeral deployments.
//!
//! Storage failures are never fatal to the engine - it logs and retries on
//! the next checkpoint tick - so every operation returns a plain
//! [`StorageError`] and callers decide how loudly to complain.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage operation timed out")]
    Timeout,

    #[error("stored value is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),
}

/// Key/value document store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Atomically insert or replace the value under `key`.
    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Snapshot all entries whose key starts with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError>;
}

/// Open the backend selected by the configuration.
pub async fn open(config: &Config) -> Result<Arc<dyn StateStore>, StorageError> {
    match config.storage.backend.as_str() {
        "sqlite" => {
            let store = SqliteStore::open(&config.state_path()).await?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StorageError::UnknownBackend(other.to_string())),
    }
}

/// Run a storage operation under a deadline.
///
/// Overruns become [`StorageError::Timeout`], which callers treat like any
/// other storage failure.
pub async fn with_deadline<T>(
    deadline: Duration,
    op: impl std::future::Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_open_memory_backend() {
        let mut config = Config::default();
        config.storage.backend = "memory".to_string();
        let store = open(&config).await.unwrap();
        store.set("k", &json!(1)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_open_unknown_backend() {
        let mut config = Config::default();
        config.storage.backend = "redis".to_string();
        assert!(matches!(
            open(&config).await,
            Err(StorageError::UnknownBackend(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_overrun_is_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        let result = with_deadline(Duration::from_secs(5), slow).await;
        assert!(matches!(result, Err(StorageError::Timeout)));
    }
}
