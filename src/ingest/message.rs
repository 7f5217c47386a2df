//! Inbound readings pushed by an extraction collaborator.
//!
//! Messages do not name their city; it is resolved from the page URL through
//! the city registry. A message whose URL matches no city is dropped.

use crate::cities::{self, CityId};
use crate::model::{MonitorError, PartialReading, ReadingMessage};

/// Resolves the message's city and normalizes its reading: the message
/// timestamp stands in for a missing `observed_at`, and the message source
/// for a missing `source_label`.
pub fn resolve_message(message: &ReadingMessage) -> Result<(CityId, PartialReading), MonitorError> {
    let city = cities::resolve_city_from_url(&message.url)
        .ok_or_else(|| MonitorError::UnknownCity(message.url.clone()))?;

    let mut reading = message.data.clone().sanitized();
    if reading.observed_at.is_none() {
        reading.observed_at = message.timestamp;
    }
    if reading.source_label.is_none() && !message.source.trim().is_empty() {
        reading.source_label = Some(message.source.trim().to_string());
    }

    Ok((city, reading))
}

/// Parses a message from JSON text.
pub fn parse_message(text: &str) -> Result<ReadingMessage, serde_json::Error> {
    serde_json::from_str(text)
}
