//! SQLite-backed key-value store.
//!
//! One `kv` table partitioned by namespace. State written under the `sync`
//! namespace survives process restarts; change events are only delivered to
//! subscribers of the same process.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::broadcast;

use super::data_dir;
use super::kv::{diff, KeyValueStore, StoreChanges, StoreMap, ValueChange};
use crate::error::StoreError;

pub const DEFAULT_NAMESPACE: &str = "sync";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    namespace: String,
    changes_tx: broadcast::Sender<StoreChanges>,
}

impl SqliteStore {
    /// Open the store at `<data dir>/eyebreak.db` in the `sync` namespace.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open(dir.join("eyebreak.db"), DEFAULT_NAMESPACE)
    }

    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, namespace: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn, namespace)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory(namespace: &str) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, namespace)
    }

    fn from_connection(conn: Connection, namespace: &str) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                namespace TEXT NOT NULL,
                key       TEXT NOT NULL,
                value     TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );",
        )?;
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
            changes_tx,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn decode(key: &str, raw: &str) -> Result<Value, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn read_one(&self, conn: &Connection, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| Self::decode(key, &raw)).transpose()
    }

    fn publish(&self, changes: StoreChanges) {
        if !changes.is_empty() {
            let _ = self.changes_tx.send(changes);
        }
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        let conn = self.conn()?;
        let mut out = StoreMap::new();
        for key in keys {
            if let Some(value) = self.read_one(&conn, key)? {
                out.insert(key.to_string(), value);
            }
        }
        Ok(out)
    }

    async fn get_all(&self) -> Result<StoreMap, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM kv WHERE namespace = ?1")?;
        let rows = stmt.query_map(params![self.namespace], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = StoreMap::new();
        for row in rows {
            let (key, raw) = row?;
            let value = Self::decode(&key, &raw)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    async fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        let changes = {
            let mut conn = self.conn()?;
            let mut current = StoreMap::new();
            for key in items.keys() {
                if let Some(value) = self.read_one(&conn, key)? {
                    current.insert(key.clone(), value);
                }
            }
            let changes = diff(&current, &items);

            let tx = conn.transaction()?;
            for (key, value) in &items {
                tx.execute(
                    "INSERT OR REPLACE INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)",
                    params![self.namespace, key, value.to_string()],
                )?;
            }
            tx.commit()?;
            changes
        };
        self.publish(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let changes = {
            let conn = self.conn()?;
            let mut changes = StoreChanges::new();
            for key in keys {
                if let Some(old) = self.read_one(&conn, key)? {
                    conn.execute(
                        "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
                        params![self.namespace, key],
                    )?;
                    changes.insert(
                        key.to_string(),
                        ValueChange {
                            old_value: Some(old),
                            new_value: None,
                        },
                    );
                }
            }
            changes
        };
        self.publish(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChanges> {
        self.changes_tx.subscribe()
    }
}
