//! Periodic polling of every city.
//!
//! A cycle walks the city list strictly in order, pausing between cities.
//! Each city gets a live reading when `useRealData` is on, falling back to a
//! synthetic one when the live source times out, errors or finds nothing,
//! and the result is pushed through the pipeline. A failure for one city
//! never stops the rest of the cycle.
//!
//! Overlapping ticks are skipped: if a cycle is still running when the next
//! tick fires, the tick is logged and dropped. Manual refreshes bypass the
//! guard and race with scheduled polls on a last-write-wins basis.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::alert::notify::Notifier;
use crate::cities::{self, CityId};
use crate::logging::{self, LogSource};
use crate::model::{ExtractionError, MonitorError, PartialReading, WarningEvent};
use crate::pipeline::{IngestOutcome, Pipeline};
use crate::settings;
use crate::source::ReadingSource;
use crate::store::KeyValueStore;

pub const DEFAULT_INTER_CITY_PAUSE: Duration = Duration::from_secs(2);
pub const DEFAULT_PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    /// Pause between finishing one city and starting the next.
    pub inter_city_pause: Duration,
    /// How long the live source gets before the slot falls back.
    pub page_load_timeout: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            inter_city_pause: DEFAULT_INTER_CITY_PAUSE,
            page_load_timeout: DEFAULT_PAGE_LOAD_TIMEOUT,
        }
    }
}

/// Where a city's reading came from in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingOrigin {
    Live,
    /// Live data switched off in settings.
    Synthetic,
    /// Live data was wanted but unavailable.
    Fallback,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub polled: usize,
    pub live: usize,
    pub synthetic: usize,
    pub fallback: usize,
    pub failed: usize,
    pub warnings: Vec<WarningEvent>,
    /// Cities in the order they were polled.
    pub order: Vec<CityId>,
    pub cancelled: bool,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PollScheduler<S, N, L, F> {
    pipeline: Arc<Pipeline<S, N>>,
    live: L,
    synthetic: F,
    cities: Vec<CityId>,
    timing: SchedulerTiming,
    running: AtomicBool,
}

impl<S, N, L, F> PollScheduler<S, N, L, F>
where
    S: KeyValueStore + 'static,
    N: Notifier + 'static,
    L: ReadingSource + 'static,
    F: ReadingSource + 'static,
{
    pub fn new(pipeline: Arc<Pipeline<S, N>>, live: L, synthetic: F, timing: SchedulerTiming) -> Self {
        Self {
            pipeline,
            live,
            synthetic,
            cities: cities::all_city_ids(),
            timing,
            running: AtomicBool::new(false),
        }
    }

    /// Polls `cities` in the given order instead of the registry order.
    pub fn with_cities(mut self, cities: Vec<CityId>) -> Self {
        self.cities = cities;
        self
    }

    pub fn pipeline(&self) -> &Pipeline<S, N> {
        &self.pipeline
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one full cycle. Returns `None` when a cycle is already running.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<CycleReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            logging::warn(
                LogSource::Scheduler,
                None,
                "previous polling cycle still running; skipping this tick",
            );
            return None;
        }
        let _guard = RunningGuard(&self.running);
        Some(self.cycle(cancel).await)
    }

    async fn cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let use_real_data = match self.pipeline.settings().await {
            Ok(s) => s.use_real_data,
            Err(e) => {
                logging::log_store_failure(None, "read settings", &e);
                self.pipeline.defaults().use_real_data
            }
        };

        let mut report = CycleReport::default();
        for (i, &city) in self.cities.iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.timing.inter_city_pause) => {}
                }
            }
            if cancel.is_cancelled() {
                logging::info(LogSource::Scheduler, None, "polling cycle cancelled");
                report.cancelled = true;
                break;
            }

            report.order.push(city);
            report.polled += 1;
            let (reading, origin) = self.acquire(city, use_real_data).await;
            match self.pipeline.ingest(city, &reading).await {
                Ok(outcome) => {
                    match origin {
                        ReadingOrigin::Live => report.live += 1,
                        ReadingOrigin::Synthetic => report.synthetic += 1,
                        ReadingOrigin::Fallback => report.fallback += 1,
                    }
                    report.warnings.extend(outcome.warnings);
                }
                Err(e) => {
                    logging::log_store_failure(Some(city), "ingest", &e);
                    report.failed += 1;
                }
            }
        }

        if !report.cancelled {
            self.recheck_selected().await;
        }

        logging::log_cycle_summary(
            report.polled,
            report.live,
            report.synthetic,
            report.fallback,
            report.failed,
        );
        report
    }

    /// Re-evaluates the selected city's persisted record after a cycle.
    async fn recheck_selected(&self) {
        let selected = match self.pipeline.settings().await {
            Ok(s) => s.selected_city,
            Err(e) => {
                logging::log_store_failure(None, "read settings", &e);
                return;
            }
        };
        if let Err(e) = self.pipeline.recheck(selected).await {
            logging::log_store_failure(Some(selected), "recheck", &e);
        }
    }

    /// Produces a reading for `city`, never failing: any live failure falls
    /// back to the synthetic source.
    async fn acquire(&self, city: CityId, use_real_data: bool) -> (PartialReading, ReadingOrigin) {
        if use_real_data {
            let timeout = self.timing.page_load_timeout;
            let err = match tokio::time::timeout(timeout, self.live.fetch(city)).await {
                Ok(Ok(Some(reading))) if !reading.is_empty() => {
                    logging::debug(LogSource::Extractor, Some(city), "live reading extracted");
                    return (reading, ReadingOrigin::Live);
                }
                Ok(Ok(_)) => ExtractionError::NoData(city),
                Ok(Err(e)) => e,
                Err(_) => ExtractionError::Timeout { city, secs: timeout.as_secs() },
            };
            logging::log_extraction_failure(city, self.live.name(), &err);
            (self.synthetic_reading(city).await, ReadingOrigin::Fallback)
        } else {
            (self.synthetic_reading(city).await, ReadingOrigin::Synthetic)
        }
    }

    async fn synthetic_reading(&self, city: CityId) -> PartialReading {
        match self.synthetic.fetch(city).await {
            Ok(Some(reading)) => reading,
            Ok(None) => PartialReading::default(),
            Err(e) => {
                logging::warn(
                    LogSource::Synthetic,
                    Some(city),
                    &format!("{} source failed: {}", self.synthetic.name(), e),
                );
                PartialReading::default()
            }
        }
    }

    /// Refreshes a single city on demand. Runs outside the cycle guard.
    pub async fn refresh_city(&self, city: CityId) -> Result<IngestOutcome, MonitorError> {
        let settings = self.pipeline.settings().await?;
        let (reading, origin) = self.acquire(city, settings.use_real_data).await;
        logging::info(
            LogSource::Scheduler,
            Some(city),
            &format!("manual refresh ({:?} reading)", origin),
        );
        self.pipeline.ingest(city, &reading).await
    }

    /// Runs first-install setup if needed, then ticks every `frequencyMinutes`
    /// until `cancel` fires. The frequency is re-read before every wait.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut cycles = JoinSet::new();

        match settings::is_installed(self.pipeline.store()).await {
            Ok(true) => {}
            Ok(false) => match settings::install(self.pipeline.store(), self.pipeline.defaults()).await {
                Ok(()) => {
                    logging::info(
                        LogSource::System,
                        None,
                        "first run: default settings written, polling immediately",
                    );
                    self.spawn_cycle(&mut cycles, &cancel);
                }
                Err(e) => logging::log_store_failure(None, "install", &e),
            },
            Err(e) => logging::log_store_failure(None, "read install marker", &e),
        }

        loop {
            let minutes = match self.pipeline.settings().await {
                Ok(s) => s.frequency_minutes,
                Err(e) => {
                    logging::log_store_failure(None, "read settings", &e);
                    self.pipeline.defaults().frequency_minutes
                }
            };
            let period = Duration::from_secs(u64::from(minutes.max(1)) * 60);
            logging::debug(
                LogSource::Scheduler,
                None,
                &format!("next polling cycle in {} minute(s)", minutes),
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }

            while cycles.try_join_next().is_some() {}
            self.spawn_cycle(&mut cycles, &cancel);
        }

        while cycles.join_next().await.is_some() {}
        logging::info(LogSource::Scheduler, None, "scheduler stopped");
    }

    fn spawn_cycle(self: &Arc<Self>, cycles: &mut JoinSet<()>, cancel: &CancellationToken) {
        let this = Arc::clone(self);
        let cancel = cancel.clone();
        cycles.spawn(async move {
            this.run_cycle(&cancel).await;
        });
    }
}
