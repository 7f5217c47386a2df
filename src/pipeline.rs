//! Reading → record → warnings → notifications.
//!
//! `Pipeline` owns the store and the notifier and runs the per-city flow
//! shared by scheduled polls, manual refreshes and inbound messages:
//! load the previous record, merge, persist, read the current settings,
//! evaluate, and forward warnings.

use chrono::{DateTime, Utc};

use crate::alert::notify::Notifier;
use crate::alert::thresholds::{self, notification_for};
use crate::cities::CityId;
use crate::ingest::merge::merge_at;
use crate::ingest::message::resolve_message;
use crate::logging::{self, LogSource};
use crate::model::{
    CanonicalRecord, MonitorError, PartialReading, ReadingMessage, StoreError, WarningEvent,
};
use crate::settings::Settings;
use crate::store::{self, KeyValueStore};

/// Result of one ingest.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub city: CityId,
    pub record: CanonicalRecord,
    pub warnings: Vec<WarningEvent>,
    /// False when notifications are switched off in settings.
    pub notified: bool,
}

pub struct Pipeline<S, N> {
    store: S,
    notifier: N,
    defaults: Settings,
}

impl<S: KeyValueStore, N: Notifier> Pipeline<S, N> {
    pub fn new(store: S, notifier: N, defaults: Settings) -> Self {
        Self { store, notifier, defaults }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    /// Current settings, read fresh from the store.
    pub async fn settings(&self) -> Result<Settings, StoreError> {
        Settings::load(&self.store, &self.defaults).await
    }

    pub async fn record(&self, city: CityId) -> Result<Option<CanonicalRecord>, StoreError> {
        store::load_record(&self.store, city).await
    }

    /// Merges `reading` into the city's record and raises any warnings.
    pub async fn ingest(
        &self,
        city: CityId,
        reading: &PartialReading,
    ) -> Result<IngestOutcome, MonitorError> {
        self.ingest_at(city, reading, None, Utc::now()).await
    }

    /// `ingest` with an explicit merge time and optional page URL.
    pub async fn ingest_at(
        &self,
        city: CityId,
        reading: &PartialReading,
        source_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, MonitorError> {
        let previous = store::load_record(&self.store, city).await?;
        let mut record = merge_at(city, previous.as_ref(), reading, now);
        if let Some(url) = source_url {
            record.source_url = Some(url.to_string());
        }
        store::save_record(&self.store, &record).await?;

        let settings = self.evaluation_settings(city).await;
        let warnings = thresholds::evaluate(&record, &settings.thresholds);
        let notified = self.dispatch(&warnings, &settings).await;

        logging::debug(
            LogSource::Store,
            Some(city),
            &format!(
                "persisted record: index={:?}, {} pollutant(s), {} warning(s)",
                record.index,
                record.pollutants.len(),
                warnings.len()
            ),
        );

        Ok(IngestOutcome { city, record, warnings, notified })
    }

    /// Re-evaluates the already-persisted record for `city` without merging.
    pub async fn recheck(&self, city: CityId) -> Result<Vec<WarningEvent>, MonitorError> {
        let Some(record) = store::load_record(&self.store, city).await? else {
            return Ok(Vec::new());
        };
        let settings = self.evaluation_settings(city).await;
        let warnings = thresholds::evaluate(&record, &settings.thresholds);
        self.dispatch(&warnings, &settings).await;
        Ok(warnings)
    }

    /// Ingests a reading pushed by an extraction collaborator.
    pub async fn handle_message(
        &self,
        message: &ReadingMessage,
    ) -> Result<IngestOutcome, MonitorError> {
        let (city, reading) = match resolve_message(message) {
            Ok(resolved) => resolved,
            Err(e) => {
                logging::warn(
                    LogSource::Inbound,
                    None,
                    &format!("dropping message from '{}': {}", message.source, e),
                );
                return Err(e);
            }
        };
        logging::info(
            LogSource::Inbound,
            Some(city),
            &format!("reading from '{}' ({})", message.source, message.url),
        );
        self.ingest_at(city, &reading, Some(&message.url), Utc::now()).await
    }

    /// Settings for evaluating a record that is already persisted. A failed
    /// read falls back to the defaults so the stored record still gets checked.
    async fn evaluation_settings(&self, city: CityId) -> Settings {
        match self.settings().await {
            Ok(settings) => settings,
            Err(e) => {
                logging::log_store_failure(Some(city), "read settings (using defaults)", &e);
                self.defaults.clone()
            }
        }
    }

    /// Forwards each warning to the notifier. Returns false when
    /// notifications are disabled.
    async fn dispatch(&self, warnings: &[WarningEvent], settings: &Settings) -> bool {
        if warnings.is_empty() {
            return settings.notifications_enabled;
        }
        if !settings.notifications_enabled {
            logging::info(
                LogSource::Notifier,
                warnings.first().map(|w| w.city),
                &format!("{} warning(s) suppressed: notifications disabled", warnings.len()),
            );
            return false;
        }
        for warning in warnings {
            self.notifier
                .notify(warning.city, &notification_for(warning))
                .await;
        }
        true
    }
}
