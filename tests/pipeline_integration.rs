/// Integration tests for the reading → record → warning pipeline
///
/// These tests verify:
/// 1. Partial readings merge field-wise into the stored record
/// 2. Threshold evaluation runs against the merged record and fresh settings
/// 3. Notifications are forwarded only when enabled
/// 4. Records survive a settings reset
///
/// All state lives in an in-memory store; no network access is needed.
///
/// Run with: cargo test --test pipeline_integration

use aqmon_service::alert::notify::RecordingNotifier;
use aqmon_service::cities::CityId;
use aqmon_service::model::{PartialReading, Pollutant, WarningMetric};
use aqmon_service::pipeline::Pipeline;
use aqmon_service::settings::Settings;
use aqmon_service::store::{self, KeyValueStore, MemoryStore};

use chrono::{TimeZone, Utc};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn pipeline() -> Pipeline<MemoryStore, RecordingNotifier> {
    Pipeline::new(MemoryStore::new(), RecordingNotifier::new(), Settings::default())
}

fn index_reading(index: u32) -> PartialReading {
    PartialReading {
        index: Some(index),
        ..Default::default()
    }
}

fn pm25_reading(value: f64) -> PartialReading {
    let mut reading = PartialReading::default();
    reading.pollutants.insert(Pollutant::FineParticulate, value);
    reading
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_index_update_keeps_previous_pollutants() {
    let p = pipeline();

    let mut first = index_reading(80);
    first.pollutants.insert(Pollutant::FineParticulate, 20.0);
    let outcome = p.ingest(CityId::Lipetsk, &first).await.unwrap();
    assert!(outcome.warnings.is_empty());

    let outcome = p.ingest(CityId::Lipetsk, &index_reading(120)).await.unwrap();
    assert_eq!(outcome.record.index, Some(120));
    assert_eq!(outcome.record.pollutant(Pollutant::FineParticulate), Some(20.0));

    assert_eq!(outcome.warnings.len(), 1, "only the index should warn");
    assert_eq!(outcome.warnings[0].metric, WarningMetric::Index);
    assert_eq!(outcome.warnings[0].observed, 120.0);
    assert_eq!(outcome.warnings[0].limit, 100.0);

    let sent = p.notifier().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, CityId::Lipetsk);
    assert!(sent[0].1.title.contains("Lipetsk"));
}

#[tokio::test]
async fn test_first_reading_with_pollutants_only() {
    let p = pipeline();

    let outcome = p.ingest(CityId::Moscow, &pm25_reading(40.0)).await.unwrap();
    assert_eq!(outcome.record.index, None);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].metric, WarningMetric::FineParticulate);
}

#[tokio::test]
async fn test_raising_index_limit_suppresses_warning() {
    let p = pipeline();
    assert_eq!(p.ingest(CityId::Petersburg, &index_reading(130)).await.unwrap().warnings.len(), 1);

    let mut settings = p.settings().await.unwrap();
    settings.thresholds.index_limit = 131;
    settings.save(p.store()).await.unwrap();

    assert!(p.recheck(CityId::Petersburg).await.unwrap().is_empty());
    assert_eq!(p.notifier().sent().len(), 1);
}

#[tokio::test]
async fn test_cities_do_not_share_records() {
    let p = pipeline();
    p.ingest(CityId::Lipetsk, &index_reading(10)).await.unwrap();
    p.ingest(CityId::Moscow, &index_reading(20)).await.unwrap();

    assert_eq!(p.record(CityId::Lipetsk).await.unwrap().unwrap().index, Some(10));
    assert_eq!(p.record(CityId::Moscow).await.unwrap().unwrap().index, Some(20));
    assert!(p.record(CityId::Petersburg).await.unwrap().is_none());
}

#[tokio::test]
async fn test_merge_timestamps_are_persisted() {
    let p = pipeline();
    let now = Utc.with_ymd_and_hms(2024, 12, 1, 8, 30, 0).unwrap();
    let mut reading = index_reading(42);
    reading.observed_at = Some(now);

    p.ingest_at(CityId::Lipetsk, &reading, None, now).await.unwrap();

    let record = p.record(CityId::Lipetsk).await.unwrap().unwrap();
    assert_eq!(record.last_observed_at, Some(now));
    assert_eq!(record.last_persisted_at, Some(now));

    let stamp = p
        .store()
        .get(&store::last_persisted_key(CityId::Lipetsk))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stamp.as_str(), Some(now.to_rfc3339().as_str()));
}

#[tokio::test]
async fn test_settings_reset_keeps_records() {
    let p = pipeline();
    p.ingest(CityId::Moscow, &index_reading(55)).await.unwrap();

    let mut settings = p.settings().await.unwrap();
    settings.thresholds.index_limit = 10;
    settings.notifications_enabled = false;
    settings.save(p.store()).await.unwrap();

    let reset = Settings::reset(p.store(), p.defaults()).await.unwrap();
    assert_eq!(reset, Settings::default());
    assert_eq!(p.record(CityId::Moscow).await.unwrap().unwrap().index, Some(55));
}

#[tokio::test]
async fn test_notifications_off_then_on() {
    let p = pipeline();
    let mut settings = p.settings().await.unwrap();
    settings.notifications_enabled = false;
    settings.save(p.store()).await.unwrap();

    let outcome = p.ingest(CityId::Lipetsk, &index_reading(180)).await.unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert!(p.notifier().sent().is_empty());

    settings.notifications_enabled = true;
    settings.save(p.store()).await.unwrap();
    assert_eq!(p.recheck(CityId::Lipetsk).await.unwrap().len(), 1);
    assert_eq!(p.notifier().sent().len(), 1);
}
