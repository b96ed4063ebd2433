use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::errors::ConductorError;
use super::store::StateStore;

/// SQLite-backed [`StateStore`]. Expired rows read as absent and are removed
/// the next time they are touched.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConductorError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| ConductorError::Persistence(format!("Failed to open {}: {}", path.display(), e)))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| ConductorError::Persistence(format!("Failed to set pragmas: {}", e)))?;
        Self::initialize(conn)
    }

    pub fn in_memory() -> Result<Self, ConductorError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ConductorError::Persistence(format!("Failed to open in-memory db: {}", e)))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, ConductorError> {
        conn.execute_batch(super::schema::CREATE_TABLES)
            .map_err(|e| ConductorError::Persistence(format!("Failed to create tables: {}", e)))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Delete every expired row. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, ConductorError> {
        let now = Utc::now().timestamp_millis();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM agent_state WHERE expires_at <= ?1", params![now])
        }).await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, ConductorError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard).map_err(ConductorError::from)
        })
        .await
        .map_err(|e| ConductorError::Internal(format!("sqlite task failed: {}", e)))?
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConductorError> {
        let key = key.to_string();
        let now = Utc::now().timestamp_millis();
        self.blocking(move |conn| {
            let row: Option<(Vec<u8>, i64)> = conn
                .query_row(
                    "SELECT value, expires_at FROM agent_state WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((_, expires_at)) if expires_at <= now => {
                    conn.execute("DELETE FROM agent_state WHERE key = ?1", params![key])?;
                    debug!(key = %key, "Purged expired entry");
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        }).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), ConductorError> {
        let key = key.to_string();
        let now = Utc::now();
        let expires_at = now.timestamp_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        let updated_at = now.to_rfc3339();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO agent_state (key, value, expires_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![key, value, expires_at, updated_at],
            )?;
            Ok(())
        }).await
    }

    async fn delete(&self, key: &str) -> Result<bool, ConductorError> {
        let key = key.to_string();
        let now = Utc::now().timestamp_millis();
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM agent_state WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
            )?;
            conn.execute("DELETE FROM agent_state WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        }).await
    }

    async fn ping(&self) -> bool {
        self.blocking(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .is_ok()
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("agent:sales:s1", b"{}".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("agent:sales:s1").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.get("agent:sales:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("k", b"one".to_vec(), Duration::from_secs(60)).await.unwrap();
        store.set("k", b"two".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("k", b"v".to_vec(), Duration::MAX).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_absent() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("old", b"v".to_vec(), Duration::ZERO).await.unwrap();
        store.set("live", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("conductor.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            assert!(store.ping().await);
            store.set("k", b"persisted".to_vec(), Duration::from_secs(60)).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some(b"persisted".to_vec()));
        assert_eq!(reopened.backend_name(), "sqlite");
    }
}
