//! Service configuration.
//!
//! Loaded from `aqmon.toml` when present. Every section and field has a
//! default, so a missing file or a partial file is fine. `.env` is read
//! first; `DATABASE_URL` and `AQMON_STORE_PATH` override the file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::alert::notify::AnyNotifier;
use crate::model::StoreError;
use crate::scheduler::SchedulerTiming;
use crate::settings::{DEFAULT_FREQUENCY_MINUTES, Settings};
use crate::store::{AnyStore, FileStore, MemoryStore, PostgresStore};

pub const DEFAULT_CONFIG_PATH: &str = "aqmon.toml";
pub const DEFAULT_STORE_PATH: &str = "aqmon_state.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    /// Only ever set from the environment.
    #[serde(skip)]
    pub database_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: PathBuf::from(DEFAULT_STORE_PATH),
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub inter_city_pause_secs: u64,
    pub page_load_timeout_secs: u64,
    pub default_frequency_minutes: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            inter_city_pause_secs: 2,
            page_load_timeout_secs: 5,
            default_frequency_minutes: DEFAULT_FREQUENCY_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Send desktop notifications through `notify-send` as well as logging.
    pub desktop: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
    pub notifications: NotificationsConfig,
}

impl ServiceConfig {
    /// Reads `path` (defaults when the file does not exist), applies
    /// environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&text)?
        } else {
            Self::default()
        };

        if let Ok(url) = env::var("DATABASE_URL") {
            config.store.database_url = Some(url);
        }
        if let Ok(store_path) = env::var("AQMON_STORE_PATH") {
            config.store.path = PathBuf::from(store_path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.inter_city_pause_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.inter_city_pause_secs must be greater than 0".into(),
            ));
        }
        if self.polling.page_load_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.page_load_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.polling.default_frequency_minutes < 1 {
            return Err(ConfigError::Invalid(
                "polling.default_frequency_minutes must be at least 1".into(),
            ));
        }
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "store.backend = \"postgres\" requires DATABASE_URL".into(),
            ));
        }
        Ok(())
    }

    pub fn timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            inter_city_pause: Duration::from_secs(self.polling.inter_city_pause_secs),
            page_load_timeout: self.page_load_timeout(),
        }
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.polling.page_load_timeout_secs)
    }

    /// Settings written on first install and used for missing keys.
    pub fn default_settings(&self) -> Settings {
        Settings::with_frequency(self.polling.default_frequency_minutes)
    }

    pub fn notifier(&self) -> AnyNotifier {
        AnyNotifier::from_config(self.notifications.desktop)
    }

    pub async fn open_store(&self) -> Result<AnyStore, StoreError> {
        match self.store.backend {
            StoreBackend::Memory => Ok(AnyStore::Memory(MemoryStore::new())),
            StoreBackend::File => Ok(AnyStore::File(FileStore::open(&self.store.path)?)),
            StoreBackend::Postgres => {
                let url = self.store.database_url.as_deref().unwrap_or_default();
                Ok(AnyStore::Postgres(PostgresStore::connect(url).await?))
            }
        }
    }
}
