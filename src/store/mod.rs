//! Durable key-value state.
//!
//! All persistent state lives behind `KeyValueStore`: simple get/set by
//! string key with JSON values. Multi-key writes go through `set_many`, which
//! every backend applies atomically, so a city's record and its
//! last-persisted timestamp are never written half-way.
//!
//! Key layout:
//!   `{city}_record`             → `CanonicalRecord`
//!   `{city}_last_persisted_at`  → RFC 3339 timestamp string
//!   `thresholds`, `selectedCity`, `notificationsEnabled`,
//!   `frequencyMinutes`, `useRealData` → settings (see `settings`)
//!   `installedAt`               → first-install marker

pub mod file;
pub mod memory;
pub mod postgres;

use std::future::Future;

use serde_json::Value;

use crate::cities::CityId;
use crate::model::{CanonicalRecord, StoreError};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub const INSTALLED_KEY: &str = "installedAt";

/// Get/set by string key. Implementations serialize individual writes;
/// concurrent writers to the same key resolve as last-write-wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Writes all entries or none of them.
    fn set_many(
        &self,
        entries: Vec<(String, Value)>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set(&self, key: &str, value: Value) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.set_many(vec![(key.to_string(), value)])
    }
}

pub fn record_key(city: CityId) -> String {
    format!("{}_record", city.key())
}

pub fn last_persisted_key(city: CityId) -> String {
    format!("{}_last_persisted_at", city.key())
}

/// Loads the canonical record for `city`, or `None` if it was never written.
pub async fn load_record<S: KeyValueStore>(
    store: &S,
    city: CityId,
) -> Result<Option<CanonicalRecord>, StoreError> {
    let key = record_key(city);
    match store.get(&key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Corrupt { key, reason: e.to_string() }),
    }
}

/// Persists a record together with its last-persisted timestamp in one write.
pub async fn save_record<S: KeyValueStore>(
    store: &S,
    record: &CanonicalRecord,
) -> Result<(), StoreError> {
    let mut entries = vec![(record_key(record.city), serde_json::to_value(record)?)];
    if let Some(at) = record.last_persisted_at {
        entries.push((last_persisted_key(record.city), Value::String(at.to_rfc3339())));
    }
    store.set_many(entries).await
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// One of the built-in backends, chosen from configuration.
pub enum AnyStore {
    Memory(MemoryStore),
    File(FileStore),
    Postgres(PostgresStore),
}

impl KeyValueStore for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self {
            AnyStore::Memory(s) => s.get(key).await,
            AnyStore::File(s) => s.get(key).await,
            AnyStore::Postgres(s) => s.get(key).await,
        }
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(s) => s.set_many(entries).await,
            AnyStore::File(s) => s.set_many(entries).await,
            AnyStore::Postgres(s) => s.set_many(entries).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
