//! Field-wise merge of a partial reading into a city's canonical record.
//!
//! # Clock injection
//! `merge_at` takes the merge time as a parameter rather than calling
//! `Utc::now()` internally, so merges are deterministic in tests.

use chrono::{DateTime, Utc};

use crate::cities::CityId;
use crate::model::{CanonicalRecord, PartialReading};

/// Merges `incoming` into `previous` as of `now`.
///
/// - `index`, `advisory`, `source_label` and `last_observed_at` are replaced
///   only when the reading carries a value.
/// - `pollutants` is overwritten key by key; keys the reading does not
///   mention keep their previous value.
/// - `last_persisted_at` is always set to `now`.
///
/// An absent `previous` is treated as an empty record for `city`.
pub fn merge_at(
    city: CityId,
    previous: Option<&CanonicalRecord>,
    incoming: &PartialReading,
    now: DateTime<Utc>,
) -> CanonicalRecord {
    let mut merged = previous
        .cloned()
        .unwrap_or_else(|| CanonicalRecord::empty(city));
    merged.city = city;

    if let Some(index) = incoming.index {
        merged.index = Some(index);
    }
    for (pollutant, value) in &incoming.pollutants {
        merged.pollutants.insert(*pollutant, *value);
    }
    if let Some(advisory) = &incoming.advisory {
        merged.advisory = Some(advisory.clone());
    }
    if let Some(label) = &incoming.source_label {
        merged.source_label = Some(label.clone());
    }
    if let Some(observed_at) = incoming.observed_at {
        merged.last_observed_at = Some(observed_at);
    }
    merged.last_persisted_at = Some(now);

    merged
}

/// Convenience wrapper that uses the real current time.
/// Use `merge_at` in tests to keep them deterministic.
pub fn merge(
    city: CityId,
    previous: Option<&CanonicalRecord>,
    incoming: &PartialReading,
) -> CanonicalRecord {
    merge_at(city, previous, incoming, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pollutant;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 3, 9, 30, 0).unwrap()
    }

    fn record_with(index: Option<u32>, pollutants: &[(Pollutant, f64)]) -> CanonicalRecord {
        let mut record = CanonicalRecord::empty(CityId::Lipetsk);
        record.index = index;
        record.pollutants = pollutants.iter().copied().collect();
        record.source_label = Some("previous source".into());
        record.last_observed_at = Some(Utc.with_ymd_and_hms(2024, 11, 3, 9, 0, 0).unwrap());
        record.last_persisted_at = Some(Utc.with_ymd_and_hms(2024, 11, 3, 9, 0, 5).unwrap());
        record
    }

    #[test]
    fn test_incoming_index_replaces_previous() {
        let prev = record_with(Some(80), &[]);
        let incoming = PartialReading { index: Some(120), ..Default::default() };
        let merged = merge_at(CityId::Lipetsk, Some(&prev), &incoming, fixed_now());
        assert_eq!(merged.index, Some(120));
    }

    #[test]
    fn test_missing_index_keeps_previous() {
        let prev = record_with(Some(80), &[]);
        let merged = merge_at(CityId::Lipetsk, Some(&prev), &PartialReading::default(), fixed_now());
        assert_eq!(merged.index, Some(80));
    }

    #[test]
    fn test_pollutants_absent_from_reading_are_not_erased() {
        let prev = record_with(
            None,
            &[(Pollutant::FineParticulate, 20.0), (Pollutant::Ozone, 31.0)],
        );
        let mut incoming = PartialReading::default();
        incoming.pollutants.insert(Pollutant::Ozone, 44.0);
        incoming.pollutants.insert(Pollutant::CarbonMonoxide, 0.7);

        let merged = merge_at(CityId::Lipetsk, Some(&prev), &incoming, fixed_now());
        assert_eq!(merged.pollutant(Pollutant::FineParticulate), Some(20.0));
        assert_eq!(merged.pollutant(Pollutant::Ozone), Some(44.0));
        assert_eq!(merged.pollutant(Pollutant::CarbonMonoxide), Some(0.7));
        assert_eq!(merged.pollutants.len(), 3);
    }

    #[test]
    fn test_source_label_and_observed_at_only_replaced_when_present() {
        let prev = record_with(Some(10), &[]);
        let merged = merge_at(CityId::Lipetsk, Some(&prev), &PartialReading::default(), fixed_now());
        assert_eq!(merged.source_label.as_deref(), Some("previous source"));
        assert_eq!(merged.last_observed_at, prev.last_observed_at);

        let observed = Utc.with_ymd_and_hms(2024, 11, 3, 9, 29, 0).unwrap();
        let incoming = PartialReading {
            source_label: Some("accuweather".into()),
            observed_at: Some(observed),
            ..Default::default()
        };
        let merged = merge_at(CityId::Lipetsk, Some(&prev), &incoming, fixed_now());
        assert_eq!(merged.source_label.as_deref(), Some("accuweather"));
        assert_eq!(merged.last_observed_at, Some(observed));
    }

    #[test]
    fn test_last_persisted_at_always_updated() {
        let prev = record_with(Some(10), &[]);
        let merged = merge_at(CityId::Lipetsk, Some(&prev), &PartialReading::default(), fixed_now());
        assert_eq!(merged.last_persisted_at, Some(fixed_now()));
    }

    #[test]
    fn test_absent_previous_starts_from_empty_record() {
        let mut incoming = PartialReading::default();
        incoming.pollutants.insert(Pollutant::FineParticulate, 40.0);

        let merged = merge_at(CityId::Moscow, None, &incoming, fixed_now());
        assert_eq!(merged.city, CityId::Moscow);
        assert_eq!(merged.index, None);
        assert_eq!(merged.pollutant(Pollutant::FineParticulate), Some(40.0));
        assert_eq!(merged.source_label, None);
        assert_eq!(merged.last_observed_at, None);
    }

    #[test]
    fn test_merge_is_idempotent_for_fixed_clock() {
        let prev = record_with(Some(80), &[(Pollutant::CoarseParticulate, 41.0)]);
        let mut incoming = PartialReading {
            index: Some(95),
            advisory: Some("limit outdoor activity".into()),
            observed_at: Some(Utc.with_ymd_and_hms(2024, 11, 3, 9, 25, 0).unwrap()),
            ..Default::default()
        };
        incoming.pollutants.insert(Pollutant::FineParticulate, 33.0);

        let once = merge_at(CityId::Lipetsk, Some(&prev), &incoming, fixed_now());
        let twice = merge_at(CityId::Lipetsk, Some(&once), &incoming, fixed_now());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_scenario_index_raised_pm25_retained() {
        let prev = record_with(Some(80), &[(Pollutant::FineParticulate, 20.0)]);
        let incoming = PartialReading { index: Some(120), ..Default::default() };
        let merged = merge_at(CityId::Lipetsk, Some(&prev), &incoming, fixed_now());
        assert_eq!(merged.index, Some(120));
        assert_eq!(merged.pollutant(Pollutant::FineParticulate), Some(20.0));
    }
}
