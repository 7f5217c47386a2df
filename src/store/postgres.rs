//! PostgreSQL-backed store: one `aqmon_kv` table, JSON text values.
//!
//! The synchronous `postgres` client runs on tokio's blocking pool. The
//! client owns its own runtime, so it is never dropped on an async worker.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use postgres::{Client, NoTls};
use serde_json::Value;

use super::KeyValueStore;
use crate::model::StoreError;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS aqmon_kv (
        key        TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
";

const UPSERT: &str = "
    INSERT INTO aqmon_kv (key, value, updated_at)
    VALUES ($1, $2, $3)
    ON CONFLICT (key) DO UPDATE
        SET value = EXCLUDED.value,
            updated_at = EXCLUDED.updated_at
";

type SharedClient = Arc<Mutex<Option<Client>>>;

pub struct PostgresStore {
    client: SharedClient,
}

impl PostgresStore {
    /// Connects and creates the table if needed.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let url = database_url.to_string();
        let client = tokio::task::spawn_blocking(move || -> Result<Client, StoreError> {
            let mut client = Client::connect(&url, NoTls)?;
            client.batch_execute(CREATE_TABLE)?;
            Ok(client)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        Ok(Self {
            client: Arc::new(Mutex::new(Some(client))),
        })
    }

    async fn with_client<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> Result<T, StoreError> + Send + 'static,
    {
        let shared = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let mut guard = shared
                .lock()
                .map_err(|_| StoreError::Task("postgres client lock poisoned".into()))?;
            let client = guard
                .as_mut()
                .ok_or_else(|| StoreError::Task("postgres client closed".into()))?;
            f(client)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl KeyValueStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let key = key.to_string();
        self.with_client(move |client| {
            let row = client.query_opt("SELECT value FROM aqmon_kv WHERE key = $1", &[&key])?;
            match row {
                None => Ok(None),
                Some(row) => {
                    let text: String = row.get(0);
                    serde_json::from_str(&text)
                        .map(Some)
                        .map_err(|e| StoreError::Corrupt { key, reason: e.to_string() })
                }
            }
        })
        .await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        self.with_client(move |client| {
            let now = Utc::now();
            let mut tx = client.transaction()?;
            for (key, value) in &entries {
                let text = serde_json::to_string(value)?;
                tx.execute(UPSERT, &[key, &text, &now])?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        let client = self.client.lock().ok().and_then(|mut c| c.take());
        if let Some(client) = client {
            let _ = std::thread::spawn(move || drop(client));
        }
    }
}
