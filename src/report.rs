//! City status for the presentation surface.
//!
//! Combines a city's stored record with its severity band, a
//! recommendation, the local threshold verdict and a staleness flag.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alert::stalenesses::{default_max_age_minutes, is_stale_at};
use crate::alert::thresholds;
use crate::analysis::category::AqiCategory;
use crate::cities::CityId;
use crate::model::{CanonicalRecord, Pollutant, StoreError, WarningEvent};
use crate::settings::Settings;
use crate::store::{self, KeyValueStore};

#[derive(Debug, Clone, Serialize)]
pub struct CityStatus {
    pub city: CityId,
    pub name: &'static str,
    pub station: &'static str,
    pub area: &'static str,
    pub record: Option<CanonicalRecord>,
    pub category: Option<AqiCategory>,
    pub recommendation: Option<String>,
    /// Limits the record currently breaches. Computed locally; nothing is sent.
    pub warnings: Vec<WarningEvent>,
    pub stale: bool,
}

/// Reads `city`'s record and builds its status as of `now`.
pub async fn build_status<S: KeyValueStore>(
    store: &S,
    city: CityId,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<CityStatus, StoreError> {
    let record = store::load_record(store, city).await?;
    Ok(status_for(city, record, settings, now))
}

pub fn status_for(
    city: CityId,
    record: Option<CanonicalRecord>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> CityStatus {
    let meta = city.city();
    let category = record.as_ref().and_then(|r| r.index).map(AqiCategory::from_index);
    let recommendation = record
        .as_ref()
        .and_then(|r| r.advisory.clone())
        .or_else(|| category.map(|c| c.recommendation().to_string()));
    let warnings = record
        .as_ref()
        .map(|r| thresholds::evaluate(r, &settings.thresholds))
        .unwrap_or_default();
    let max_age = default_max_age_minutes(settings.frequency_minutes);
    let stale = record.as_ref().is_none_or(|r| is_stale_at(r, max_age, now));

    CityStatus {
        city,
        name: meta.name,
        station: meta.station,
        area: meta.area,
        record,
        category,
        recommendation,
        warnings,
        stale,
    }
}

/// Pollutant value formatted for display: `--` when absent, carbon monoxide
/// with two decimals, everything else with one.
pub fn format_pollutant(pollutant: Pollutant, value: Option<f64>) -> String {
    match (pollutant, value) {
        (_, None) => "--".to_string(),
        (Pollutant::CarbonMonoxide, Some(v)) => format!("{:.2}", v),
        (_, Some(v)) => format!("{:.1}", v),
    }
}

impl CityStatus {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({}, {})", self.name, self.station, self.area);

        let index = self
            .record
            .as_ref()
            .and_then(|r| r.index)
            .map(|i| i.to_string())
            .unwrap_or_else(|| "--".to_string());
        let band = self.category.map(|c| c.label()).unwrap_or("no data");
        let _ = writeln!(out, "  AQI:        {} ({})", index, band);

        for pollutant in Pollutant::ALL {
            let value = self.record.as_ref().and_then(|r| r.pollutant(pollutant));
            let _ = writeln!(
                out,
                "  {:<11} {}",
                format!("{}:", pollutant.label()),
                format_pollutant(pollutant, value)
            );
        }

        if let Some(text) = &self.recommendation {
            let _ = writeln!(out, "  Advice:     {}", text);
        }

        let source = self
            .record
            .as_ref()
            .and_then(|r| r.source_label.as_deref())
            .unwrap_or("--");
        let updated = self
            .record
            .as_ref()
            .and_then(|r| r.last_persisted_at)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            out,
            "  Source:     {} (updated {}{})",
            source,
            updated,
            if self.stale { ", stale" } else { "" }
        );

        for warning in &self.warnings {
            let n = thresholds::notification_for(warning);
            let _ = writeln!(out, "  ⚠ {}: {}", n.title, n.message);
        }
        out
    }
}
