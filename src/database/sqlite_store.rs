//! Durable key/value backend over the `kv_store` table.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::params;
use serde_json::Value;

use super::connection::Database;
use super::store::KeyValueStore;
use crate::types::errors::StoreError;

/// Namespace used for the primary (local) store when it is SQLite-backed.
pub const PRIMARY_NAMESPACE: &str = "local";
/// Namespace used for the durable session store.
pub const DURABLE_NAMESPACE: &str = "session";

/// A namespaced view of the SQLite key/value table.
///
/// Queries run on the blocking pool so the async caller is never stalled on disk I/O.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    namespace: String,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>, namespace: &str) -> Self {
        Self {
            db,
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        let namespace = self.namespace.clone();
        tokio::task::spawn_blocking(move || op(&db, &namespace))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let key = key.to_string();
        self.run_blocking(move |db, namespace| {
            let conn = db.connection();
            let result = conn.query_row(
                "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get::<_, String>(0),
            );
            match result {
                Ok(text) => serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e))),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(StoreError::Backend(e.to_string())),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let key = key.to_string();
        let text = serde_json::to_string(&value)
            .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))?;
        self.run_blocking(move |db, namespace| {
            db.connection()
                .execute(
                    "INSERT INTO kv_store (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![namespace, key, text, now_secs()],
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.run_blocking(move |db, namespace| {
            db.connection()
                .execute(
                    "DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
