/// Canonical record staleness detection.
///
/// Cities are polled every `frequencyMinutes`. A record that has not been
/// persisted for much longer than that means polling has stopped producing
/// data for the city, which the status surface flags next to the values.
///
/// # Clock injection
/// `is_stale_at` accepts a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, so staleness is deterministic in tests.

use chrono::{DateTime, Utc};

use crate::model::CanonicalRecord;

/// Returns `true` if the record was last persisted more than
/// `max_age_minutes` before `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// A record that was never persisted is stale.
pub fn is_stale_at(record: &CanonicalRecord, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    let Some(persisted) = record.last_persisted_at else {
        return true;
    };
    let age_minutes = (now - persisted).num_minutes();
    // A timestamp in the future counts as fresh.
    age_minutes > 0 && age_minutes as u64 > max_age_minutes
}

/// Convenience wrapper that uses the real current time.
pub fn is_stale(record: &CanonicalRecord, max_age_minutes: u64) -> bool {
    is_stale_at(record, max_age_minutes, Utc::now())
}

/// Default maximum age: two missed polling ticks.
pub fn default_max_age_minutes(frequency_minutes: u32) -> u64 {
    u64::from(frequency_minutes.max(1)) * 2
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
