//! Key/value store adapter shared by the group repository and session manager.
//!
//! Values are JSON. Two backends exist: [`MemoryStore`] (fast, process-local)
//! and [`SqliteStore`](super::sqlite_store::SqliteStore) (durable).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::errors::StoreError;

/// Conceptual keys of the persisted state layout.
pub mod keys {
    pub const GROUPS: &str = "groups";
    pub const ACTIVE_GROUP_ID: &str = "activeGroupId";
    pub const MANAGED_TAB_IDS: &str = "managedTabIds";
    pub const SESSION_BACKUP: &str = "sessionBackup";
}

/// Async key/value operations over a single backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;
}

/// Reads `key` and decodes it into `T`.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e))),
    }
}

/// Encodes `value` and writes it under `key`.
pub async fn set_typed<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_value(value)
        .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))?;
    store.set(key, json).await
}

/// In-process store, the fast primary backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry, as a browser does when local storage is cleared.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
