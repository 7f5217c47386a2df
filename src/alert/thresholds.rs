//! Air-quality threshold checking.
//!
//! Turns a canonical record plus the current limits into zero or more
//! warning events, and formats the notification text for each event.

use crate::model::{CanonicalRecord, Pollutant, ThresholdConfig, WarningEvent, WarningMetric};

/// A notification ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Checks a record against the configured limits.
///
/// The index check comes first, then fine particulate. A metric that is
/// absent from the record never triggers a warning. Both checks use `>=`.
pub fn evaluate(record: &CanonicalRecord, config: &ThresholdConfig) -> Vec<WarningEvent> {
    let mut warnings = Vec::new();

    if let Some(index) = record.index {
        if index >= config.index_limit {
            warnings.push(WarningEvent {
                city: record.city,
                metric: WarningMetric::Index,
                observed: f64::from(index),
                limit: f64::from(config.index_limit),
            });
        }
    }

    if let Some(pm2_5) = record.pollutant(Pollutant::FineParticulate) {
        if pm2_5 >= config.fine_particulate_limit {
            warnings.push(WarningEvent {
                city: record.city,
                metric: WarningMetric::FineParticulate,
                observed: pm2_5,
                limit: config.fine_particulate_limit,
            });
        }
    }

    warnings
}

/// Builds the notification shown for a warning.
pub fn notification_for(warning: &WarningEvent) -> Notification {
    let city = warning.city.name();
    match warning.metric {
        WarningMetric::Index => Notification {
            title: format!("Poor air quality in {}", city),
            message: format!(
                "AQI reached {:.0} (limit {:.0}). Consider limiting time outdoors.",
                warning.observed, warning.limit
            ),
        },
        WarningMetric::FineParticulate => Notification {
            title: format!("High PM2.5 in {}", city),
            message: format!(
                "PM2.5 reached {:.1} µg/m³ (limit {:.1}). Consider limiting time outdoors.",
                warning.observed, warning.limit
            ),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
