//! SQLite key/value queue store

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{migrations, parse_records, QueueStore, QUEUE_STORAGE_KEY};
use crate::error::{Error, Result};
use crate::models::QueueItem;
use crate::util::unix_millis_now;

/// Persists the queue as one JSON value in a `kv_store` table.
///
/// Blocking SQLite calls run on the tokio blocking pool.
#[derive(Clone)]
pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueueStore {
    /// Open (or create) the database at `path` and run migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Storage("SQLite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|error| Error::Storage(format!("SQLite task failed: {error}")))?
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn load(&self) -> Result<Vec<Value>> {
        let raw = self
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM kv_store WHERE key = ?1",
                        params![QUEUE_STORAGE_KEY],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?)
            })
            .await?;

        raw.map_or_else(|| Ok(Vec::new()), |raw| parse_records(&raw))
    }

    async fn save(&self, items: &[QueueItem]) -> Result<()> {
        let payload = serde_json::to_string(items)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![QUEUE_STORAGE_KEY, payload, unix_millis_now()],
            )?;
            Ok(())
        })
        .await
    }
}
