/// Core data types for the air-quality monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// readings as they come out of a data source, the durable per-city record,
/// threshold configuration, warning events and the error enums. It contains
/// no I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cities::CityId;

// ---------------------------------------------------------------------------
// Pollutants
// ---------------------------------------------------------------------------

/// The fixed pollutant vocabulary. Serialized with the short keys used by
/// the extraction side (`pm2_5`, `pm10`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "pm2_5")]
    FineParticulate,
    #[serde(rename = "pm10")]
    CoarseParticulate,
    #[serde(rename = "no2")]
    NitrogenDioxide,
    #[serde(rename = "o3")]
    Ozone,
    #[serde(rename = "so2")]
    SulfurDioxide,
    #[serde(rename = "co")]
    CarbonMonoxide,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::FineParticulate,
        Pollutant::CoarseParticulate,
        Pollutant::NitrogenDioxide,
        Pollutant::Ozone,
        Pollutant::SulfurDioxide,
        Pollutant::CarbonMonoxide,
    ];

    /// Short key, identical to the serialized form.
    pub fn key(self) -> &'static str {
        match self {
            Pollutant::FineParticulate => "pm2_5",
            Pollutant::CoarseParticulate => "pm10",
            Pollutant::NitrogenDioxide => "no2",
            Pollutant::Ozone => "o3",
            Pollutant::SulfurDioxide => "so2",
            Pollutant::CarbonMonoxide => "co",
        }
    }

    /// Display label, e.g. "PM2.5".
    pub fn label(self) -> &'static str {
        match self {
            Pollutant::FineParticulate => "PM2.5",
            Pollutant::CoarseParticulate => "PM10",
            Pollutant::NitrogenDioxide => "NO2",
            Pollutant::Ozone => "O3",
            Pollutant::SulfurDioxide => "SO2",
            Pollutant::CarbonMonoxide => "CO",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

pub type PollutantMap = BTreeMap<Pollutant, f64>;

/// Reads a pollutant table from an outside source. Keys this service does not
/// track (e.g. `nh3`) and non-numeric values are skipped.
fn known_pollutants<'de, D>(deserializer: D) -> Result<PollutantMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let pollutant = serde_json::from_value::<Pollutant>(Value::String(key)).ok()?;
            Some((pollutant, value.as_f64()?))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One extraction result for one city at one point in time.
///
/// Every field is independently optional: a page may expose only the index,
/// only a pollutant table, or only an advisory text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialReading {
    #[serde(default, alias = "aqi", skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(
        default,
        alias = "components",
        deserialize_with = "known_pollutants",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub pollutants: PollutantMap,
    #[serde(default, alias = "recommendations", skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl PartialReading {
    /// True when the reading carries no measurement or advisory at all.
    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.pollutants.is_empty() && self.advisory.is_none()
    }

    /// Drops pollutant values that are negative or not finite, and blank advisories.
    pub fn sanitized(mut self) -> Self {
        self.pollutants.retain(|_, v| v.is_finite() && *v >= 0.0);
        if self.advisory.as_deref().is_some_and(|a| a.trim().is_empty()) {
            self.advisory = None;
        }
        self
    }
}

/// The durable, field-wise merged state for one city.
///
/// Created on the first merge for a city and updated on every later merge.
/// `pollutants` only ever gains or overwrites individual keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub city: CityId,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub pollutants: PollutantMap,
    #[serde(default)]
    pub advisory: Option<String>,
    #[serde(default)]
    pub source_label: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub last_observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_persisted_at: Option<DateTime<Utc>>,
}

impl CanonicalRecord {
    /// A record with every field absent, used when a city has no stored state.
    pub fn empty(city: CityId) -> Self {
        Self {
            city,
            index: None,
            pollutants: PollutantMap::new(),
            advisory: None,
            source_label: None,
            source_url: None,
            last_observed_at: None,
            last_persisted_at: None,
        }
    }

    pub fn pollutant(&self, pollutant: Pollutant) -> Option<f64> {
        self.pollutants.get(&pollutant).copied()
    }
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

pub const DEFAULT_INDEX_LIMIT: u32 = 100;
pub const DEFAULT_FINE_PARTICULATE_LIMIT: f64 = 35.0;

/// User-editable warning limits. Read fresh on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub index_limit: u32,
    pub fine_particulate_limit: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            index_limit: DEFAULT_INDEX_LIMIT,
            fine_particulate_limit: DEFAULT_FINE_PARTICULATE_LIMIT,
        }
    }
}

/// Which metric crossed its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningMetric {
    Index,
    FineParticulate,
}

impl fmt::Display for WarningMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningMetric::Index => write!(f, "AQI"),
            WarningMetric::FineParticulate => write!(f, "PM2.5"),
        }
    }
}

/// A threshold breach for one city. Ephemeral: forwarded to the notifier,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarningEvent {
    pub city: CityId,
    pub metric: WarningMetric,
    pub observed: f64,
    pub limit: f64,
}

// ---------------------------------------------------------------------------
// Inbound extraction message
// ---------------------------------------------------------------------------

/// Message pushed by an extraction collaborator. The city is not named; it
/// is resolved from `url` against the city registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingMessage {
    pub source: String,
    pub data: PartialReading,
    pub url: String,
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures of the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("store worker failed: {0}")]
    Task(String),

    #[error("corrupt value under key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// A data source could not produce a reading for a city.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    HttpStatus(u16),

    #[error("No data extracted for {0}")]
    NoData(CityId),

    #[error("page load timeout for {city} after {secs}s")]
    Timeout { city: CityId, secs: u64 },
}

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no known city matches '{0}'")]
    UnknownCity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pollutant_keys_match_serialized_form() {
        for p in Pollutant::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.key()));
        }
    }

    #[test]
    fn test_partial_reading_accepts_extractor_field_names() {
        let json = r#"{"aqi": 57, "components": {"pm2_5": 25.0, "co": 0.8}, "recommendations": "stay in"}"#;
        let reading: PartialReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.index, Some(57));
        assert_eq!(reading.pollutants.get(&Pollutant::FineParticulate), Some(&25.0));
        assert_eq!(reading.pollutants.get(&Pollutant::CarbonMonoxide), Some(&0.8));
        assert_eq!(reading.advisory.as_deref(), Some("stay in"));
    }

    #[test]
    fn test_sanitized_drops_negative_and_nan_values() {
        let mut reading = PartialReading::default();
        reading.pollutants.insert(Pollutant::Ozone, -1.0);
        reading.pollutants.insert(Pollutant::SulfurDioxide, f64::NAN);
        reading.pollutants.insert(Pollutant::FineParticulate, 12.0);
        reading.advisory = Some("   ".into());

        let clean = reading.sanitized();
        assert_eq!(clean.pollutants.len(), 1);
        assert_eq!(clean.pollutants.get(&Pollutant::FineParticulate), Some(&12.0));
        assert!(clean.advisory.is_none());
    }

    #[test]
    fn test_empty_reading_detection() {
        assert!(PartialReading::default().is_empty());
        let reading = PartialReading { index: Some(0), ..Default::default() };
        assert!(!reading.is_empty());
    }

    #[test]
    fn test_threshold_defaults() {
        let cfg = ThresholdConfig::default();
        assert_eq!(cfg.index_limit, 100);
        assert_eq!(cfg.fine_particulate_limit, 35.0);
    }

    #[test]
    fn test_threshold_config_uses_camel_case_keys() {
        let json = serde_json::to_value(ThresholdConfig::default()).unwrap();
        assert_eq!(json["indexLimit"], 100);
        assert_eq!(json["fineParticulateLimit"], 35.0);
    }

    #[test]
    fn test_untracked_pollutants_are_skipped() {
        let reading: PartialReading = serde_json::from_value(serde_json::json!({
            "aqi": 64,
            "components": { "pm2_5": 18.2, "nh3": 4.1, "no": 0.3, "co": "n/a" }
        }))
        .unwrap();
        assert_eq!(reading.index, Some(64));
        assert_eq!(reading.pollutants.len(), 1);
        assert_eq!(reading.pollutants[&Pollutant::FineParticulate], 18.2);
    }

    #[test]
    fn test_null_pollutant_table_is_empty() {
        let reading: PartialReading =
            serde_json::from_value(serde_json::json!({ "aqi": 30, "pollutants": null })).unwrap();
        assert_eq!(reading.index, Some(30));
        assert!(reading.pollutants.is_empty());
    }
}
