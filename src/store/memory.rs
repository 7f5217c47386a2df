//! In-process store. State is lost when the process exits; used for tests
//! and for one-off runs that should not touch disk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::KeyValueStore;
use crate::model::StoreError;

/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Task("memory store lock poisoned".into())
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let data = self.data.lock().map_err(|_| poisoned())?;
        Ok(data.get(key).cloned())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        data.extend(entries);
        Ok(())
    }
}
