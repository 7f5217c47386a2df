/// Integration tests for the polling scheduler
///
/// These tests verify:
/// 1. Cities are polled strictly in list order, with the pause between them
/// 2. A failing live source falls back to synthetic data without stopping the cycle
/// 3. A storage failure for one city is counted and the cycle goes on
/// 4. Overlapping cycles are skipped
/// 5. First install writes missing defaults and polls immediately
///
/// Time is paused (tokio test-util), so pauses and timeouts cost nothing.
///
/// Run with: cargo test --test scheduler_integration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aqmon_service::alert::notify::RecordingNotifier;
use aqmon_service::cities::CityId;
use aqmon_service::model::{ExtractionError, PartialReading, StoreError};
use aqmon_service::pipeline::Pipeline;
use aqmon_service::scheduler::{PollScheduler, SchedulerTiming};
use aqmon_service::settings::{self, Settings};
use aqmon_service::source::synthetic::SYNTHETIC_LABEL;
use aqmon_service::source::{ReadingSource, SyntheticSource};
use aqmon_service::store::{self, KeyValueStore, MemoryStore};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Live source that records each call and fails for the listed cities.
#[derive(Clone, Default)]
struct ScriptedSource {
    calls: Arc<Mutex<Vec<(CityId, Instant)>>>,
    failing: Vec<CityId>,
    delay: Duration,
}

impl ScriptedSource {
    fn failing(cities: &[CityId]) -> Self {
        Self {
            failing: cities.to_vec(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(CityId, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ReadingSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, city: CityId) -> Result<Option<PartialReading>, ExtractionError> {
        self.calls.lock().unwrap().push((city, Instant::now()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&city) {
            return Err(ExtractionError::HttpStatus(503));
        }
        Ok(Some(PartialReading {
            index: Some(42),
            source_label: Some("scripted".into()),
            ..Default::default()
        }))
    }
}

/// Memory store whose writes to one city's record fail while `broken` is set.
#[derive(Clone)]
struct BrokenCityStore {
    inner: MemoryStore,
    city: CityId,
    broken: Arc<AtomicBool>,
}

impl BrokenCityStore {
    fn new(city: CityId) -> Self {
        Self {
            inner: MemoryStore::new(),
            city,
            broken: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl KeyValueStore for BrokenCityStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<(), StoreError> {
        let target = store::record_key(self.city);
        if self.broken.load(Ordering::SeqCst) && entries.iter().any(|(k, _)| *k == target) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.set_many(entries).await
    }
}

type TestScheduler = PollScheduler<MemoryStore, RecordingNotifier, ScriptedSource, SyntheticSource>;

fn scheduler(live: ScriptedSource) -> TestScheduler {
    let pipeline = Pipeline::new(MemoryStore::new(), RecordingNotifier::new(), Settings::default());
    PollScheduler::new(
        Arc::new(pipeline),
        live,
        SyntheticSource::steady(),
        SchedulerTiming::default(),
    )
}

// ---------------------------------------------------------------------------
// Ordering and fallback
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_cities_polled_in_order_with_pause() {
    let live = ScriptedSource::default();
    let s = scheduler(live.clone());

    let report = s.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.order, vec![CityId::Lipetsk, CityId::Moscow, CityId::Petersburg]);
    assert_eq!(report.live, 3);

    let calls = live.calls();
    let order: Vec<CityId> = calls.iter().map(|(c, _)| *c).collect();
    assert_eq!(order, report.order);
    for pair in calls.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(2));
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_city_failure_falls_back_and_continues() {
    let live = ScriptedSource::failing(&[CityId::Lipetsk]);
    let s = scheduler(live.clone());

    let report = s.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.polled, 3);
    assert_eq!(report.fallback, 1);
    assert_eq!(report.live, 2);
    assert_eq!(report.failed, 0);

    let order: Vec<CityId> = live.calls().iter().map(|(c, _)| *c).collect();
    assert_eq!(order, vec![CityId::Lipetsk, CityId::Moscow, CityId::Petersburg]);

    let lipetsk = s.pipeline().record(CityId::Lipetsk).await.unwrap().unwrap();
    assert_eq!(lipetsk.source_label.as_deref(), Some(SYNTHETIC_LABEL));
    let moscow = s.pipeline().record(CityId::Moscow).await.unwrap().unwrap();
    assert_eq!(moscow.source_label.as_deref(), Some("scripted"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_page_times_out_to_fallback() {
    let live = ScriptedSource {
        delay: Duration::from_secs(30),
        ..ScriptedSource::default()
    };
    let s = scheduler(live);

    let report = s.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.fallback, 3);
    assert_eq!(report.live, 0);
}

#[tokio::test(start_paused = true)]
async fn test_selected_city_rechecked_after_cycle() {
    let s = scheduler(ScriptedSource::default());
    let mut settings = Settings::default();
    settings.thresholds.index_limit = 40;
    settings.selected_city = CityId::Moscow;
    settings.save(s.pipeline().store()).await.unwrap();

    let report = s.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.warnings.len(), 3);

    // one per city from the merge, plus the selected city's re-check
    let sent = s.pipeline().notifier().sent();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[3].0, CityId::Moscow);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_for_one_city_does_not_stop_cycle() {
    let store = BrokenCityStore::new(CityId::Moscow);
    let broken = Arc::clone(&store.broken);
    let pipeline = Pipeline::new(store, RecordingNotifier::new(), Settings::default());
    let live = ScriptedSource::default();
    let s = PollScheduler::new(
        Arc::new(pipeline),
        live.clone(),
        SyntheticSource::steady(),
        SchedulerTiming::default(),
    );

    let report = s.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.order, vec![CityId::Lipetsk, CityId::Moscow, CityId::Petersburg]);
    assert_eq!(report.polled, 3);
    assert_eq!(report.failed, 1);
    assert!(!s.is_running());
    assert!(s.pipeline().record(CityId::Moscow).await.unwrap().is_none());
    assert!(s.pipeline().record(CityId::Petersburg).await.unwrap().is_some());

    // the store recovers and the next cycle writes every city
    broken.store(false, Ordering::SeqCst);
    let report = s.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.live, 3);
    assert!(s.pipeline().record(CityId::Moscow).await.unwrap().is_some());
    assert_eq!(live.calls().len(), 6);
}

// ---------------------------------------------------------------------------
// Overlap and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped() {
    let s = scheduler(ScriptedSource::default());
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(s.run_cycle(&cancel), s.run_cycle(&cancel));
    assert!(a.is_some());
    assert!(b.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_ignores_guard() {
    let live = ScriptedSource::failing(&[CityId::Petersburg]);
    let s = scheduler(live);
    let outcome = s.refresh_city(CityId::Petersburg).await.unwrap();
    assert_eq!(outcome.record.source_label.as_deref(), Some(SYNTHETIC_LABEL));
    assert!(!s.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_first_install_polls_immediately() {
    let live = ScriptedSource::default();
    let s = Arc::new(scheduler(live.clone()));
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(Arc::clone(&s).run(cancel.clone()));
    // long enough for the install cycle, well short of the 30 minute tick
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(live.calls().len(), 3);
    assert!(settings::is_installed(s.pipeline().store()).await.unwrap());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_installed_store_waits_for_tick() {
    let live = ScriptedSource::default();
    let s = Arc::new(scheduler(live.clone()));
    settings::install(s.pipeline().store(), &Settings::with_frequency(5)).await.unwrap();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(Arc::clone(&s).run(cancel.clone()));
    tokio::time::sleep(Duration::from_secs(4 * 60)).await;
    assert!(live.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(live.calls().len(), 3);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_first_run_keeps_settings_saved_before_install() {
    let live = ScriptedSource::default();
    let s = Arc::new(scheduler(live.clone()));
    let mut saved = Settings::default();
    saved.thresholds.index_limit = 50;
    saved.selected_city = CityId::Petersburg;
    saved.notifications_enabled = false;
    saved.save(s.pipeline().store()).await.unwrap();
    assert!(!settings::is_installed(s.pipeline().store()).await.unwrap());

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&s).run(cancel.clone()));
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(live.calls().len(), 3);
    assert!(settings::is_installed(s.pipeline().store()).await.unwrap());
    let loaded = s.pipeline().settings().await.unwrap();
    assert_eq!(loaded.thresholds.index_limit, 50);
    assert_eq!(loaded.selected_city, CityId::Petersburg);
    assert!(!loaded.notifications_enabled);
    assert_eq!(loaded.frequency_minutes, 30);

    cancel.cancel();
    handle.await.unwrap();
}
