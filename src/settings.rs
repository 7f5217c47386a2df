//! User settings held in the key-value store.
//!
//! Each setting lives under its own key so that individual edits from the
//! CLI do not race with each other. Missing or malformed keys fall back to
//! their defaults. Settings are re-read for every decision; nothing here is
//! cached.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cities::{self, CityId};
use crate::logging::{self, LogSource};
use crate::model::{StoreError, ThresholdConfig};
use crate::store::{INSTALLED_KEY, KeyValueStore};

pub const THRESHOLDS_KEY: &str = "thresholds";
pub const SELECTED_CITY_KEY: &str = "selectedCity";
pub const NOTIFICATIONS_ENABLED_KEY: &str = "notificationsEnabled";
pub const FREQUENCY_MINUTES_KEY: &str = "frequencyMinutes";
pub const USE_REAL_DATA_KEY: &str = "useRealData";

pub const DEFAULT_FREQUENCY_MINUTES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub thresholds: ThresholdConfig,
    pub selected_city: CityId,
    pub notifications_enabled: bool,
    pub frequency_minutes: u32,
    pub use_real_data: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            selected_city: cities::default_city(),
            notifications_enabled: true,
            frequency_minutes: DEFAULT_FREQUENCY_MINUTES,
            use_real_data: true,
        }
    }
}

impl Settings {
    /// Same as `default()` but with a different polling frequency.
    pub fn with_frequency(frequency_minutes: u32) -> Self {
        Self {
            frequency_minutes: frequency_minutes.max(1),
            ..Self::default()
        }
    }

    /// Loads every setting, falling back per key to `defaults`.
    pub async fn load<S: KeyValueStore>(store: &S, defaults: &Settings) -> Result<Self, StoreError> {
        Ok(Self {
            thresholds: read_or(store, THRESHOLDS_KEY, defaults.thresholds).await?,
            selected_city: read_or(store, SELECTED_CITY_KEY, defaults.selected_city).await?,
            notifications_enabled: read_or(
                store,
                NOTIFICATIONS_ENABLED_KEY,
                defaults.notifications_enabled,
            )
            .await?,
            frequency_minutes: read_or(store, FREQUENCY_MINUTES_KEY, defaults.frequency_minutes)
                .await?
                .max(1),
            use_real_data: read_or(store, USE_REAL_DATA_KEY, defaults.use_real_data).await?,
        })
    }

    /// Writes every setting in one multi-key write.
    pub async fn save<S: KeyValueStore>(&self, store: &S) -> Result<(), StoreError> {
        store.set_many(self.entries()?).await
    }

    fn entries(&self) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(vec![
            (THRESHOLDS_KEY.into(), serde_json::to_value(self.thresholds)?),
            (SELECTED_CITY_KEY.into(), serde_json::to_value(self.selected_city)?),
            (NOTIFICATIONS_ENABLED_KEY.into(), Value::Bool(self.notifications_enabled)),
            (FREQUENCY_MINUTES_KEY.into(), Value::from(self.frequency_minutes.max(1))),
            (USE_REAL_DATA_KEY.into(), Value::Bool(self.use_real_data)),
        ])
    }

    /// Writes `defaults` over every setting. Stored city records are untouched.
    pub async fn reset<S: KeyValueStore>(store: &S, defaults: &Settings) -> Result<Self, StoreError> {
        defaults.save(store).await?;
        Ok(defaults.clone())
    }
}

/// Whether first-install setup has already run against this store.
pub async fn is_installed<S: KeyValueStore>(store: &S) -> Result<bool, StoreError> {
    Ok(store.get(INSTALLED_KEY).await?.is_some())
}

/// Writes defaults for settings that are not stored yet, together with the
/// install marker. Settings edited before the first run are kept.
pub async fn install<S: KeyValueStore>(store: &S, defaults: &Settings) -> Result<(), StoreError> {
    let mut entries = Vec::new();
    for (key, value) in defaults.entries()? {
        if store.get(&key).await?.is_none() {
            entries.push((key, value));
        }
    }
    entries.push((
        INSTALLED_KEY.to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    ));
    store.set_many(entries).await
}

async fn read_or<S, T>(store: &S, key: &str, default: T) -> Result<T, StoreError>
where
    S: KeyValueStore,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(default),
        Some(value) => match serde_json::from_value(value) {
            Ok(v) => Ok(v),
            Err(e) => {
                logging::warn(
                    LogSource::Store,
                    None,
                    &format!("setting '{}' is malformed, using default: {}", key, e),
                );
                Ok(default)
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
