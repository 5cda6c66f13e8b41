//! Async key-value store seam with change notifications.
//!
//! Values are JSON. Writes are last-write-wins with no transactions across
//! calls; a single `set` is applied as one batch and produces at most one
//! change event.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::error::StoreError;

pub type StoreMap = serde_json::Map<String, Value>;

/// Old and new value of a key touched by a write. `None` means absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Keys whose value changed in one write, in key order.
pub type StoreChanges = BTreeMap<String, ValueChange>;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the given keys. Absent keys are omitted from the result.
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError>;

    async fn get_all(&self) -> Result<StoreMap, StoreError>;

    async fn set(&self, items: StoreMap) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// Receive every subsequent non-empty change batch.
    fn subscribe(&self) -> broadcast::Receiver<StoreChanges>;
}

/// Build a store patch from key/value pairs.
pub fn patch<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> StoreMap {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Compute the change set of applying `items` on top of `current`.
pub(crate) fn diff(current: &StoreMap, items: &StoreMap) -> StoreChanges {
    items
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| {
            (
                key.clone(),
                ValueChange {
                    old_value: current.get(key).cloned(),
                    new_value: Some(value.clone()),
                },
            )
        })
        .collect()
}

/// In-process store, used by tests and ephemeral hosts.
pub struct MemoryStore {
    data: RwLock<StoreMap>,
    changes_tx: broadcast::Sender<StoreChanges>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_data(StoreMap::new())
    }

    pub fn with_data(data: StoreMap) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            data: RwLock::new(data),
            changes_tx,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        let data = self.data.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<StoreMap, StoreError> {
        Ok(self.data.read().await.clone())
    }

    async fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        let changes = {
            let mut data = self.data.write().await;
            let changes = diff(&data, &items);
            data.extend(items);
            changes
        };
        if !changes.is_empty() {
            // No subscribers is fine.
            let _ = self.changes_tx.send(changes);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let changes: StoreChanges = {
            let mut data = self.data.write().await;
            keys.iter()
                .filter_map(|key| {
                    data.remove(*key).map(|old| {
                        (
                            key.to_string(),
                            ValueChange {
                                old_value: Some(old),
                                new_value: None,
                            },
                        )
                    })
                })
                .collect()
        };
        if !changes.is_empty() {
            let _ = self.changes_tx.send(changes);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChanges> {
        self.changes_tx.subscribe()
    }
}
