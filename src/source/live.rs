/// Live extraction from city air-quality pages
///
/// Loads the canonical page for a city and scrapes the index, the pollutant
/// table and the advisory text out of it. Extraction is deliberately narrow:
/// a handful of class/attribute selectors and a number scan per element.
/// Anything the selectors miss is simply absent from the reading.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::html::{first_number, leading_integer, select_text};
use super::ReadingSource;
use crate::cities::CityId;
use crate::model::{ExtractionError, PartialReading, Pollutant};

const USER_AGENT: &str = concat!("aqmon/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Selectors
// ============================================================================

const INDEX_CLASSES: &[&str] = &["aq-number", "aq-index"];
const INDEX_ATTR: (&str, &str) = ("data-qa", "airQualityIndex");
const POLLUTANT_CLASSES: &[&str] = &["pollutant-item", "pollutant"];
const ADVISORY_CLASSES: &[&str] = &["air-quality-text", "advice-text", "recommendation"];

/// Labels recognised in pollutant elements. `co` is checked last because
/// its two letters also appear inside other words.
const POLLUTANT_LABELS: &[(Pollutant, &[&str])] = &[
    (Pollutant::FineParticulate, &["pm2.5", "pm2,5", "pm 2.5", "pm25"]),
    (Pollutant::CoarseParticulate, &["pm10", "pm 10"]),
    (Pollutant::NitrogenDioxide, &["no2", "no₂"]),
    (Pollutant::Ozone, &["o3", "o₃"]),
    (Pollutant::SulfurDioxide, &["so2", "so₂"]),
    (Pollutant::CarbonMonoxide, &["co"]),
];

// ============================================================================
// Extractor
// ============================================================================

pub struct LiveExtractor {
    client: reqwest::Client,
    page_timeout: Duration,
}

impl LiveExtractor {
    pub fn new(page_timeout: Duration) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, page_timeout })
    }

    pub fn page_timeout(&self) -> Duration {
        self.page_timeout
    }

    async fn load_page(&self, city: CityId) -> Result<String, ExtractionError> {
        let url = city.city().url;
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html")
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout { city, secs: self.page_timeout.as_secs() }
                } else {
                    ExtractionError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(ExtractionError::HttpStatus(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }
}

impl ReadingSource for LiveExtractor {
    fn name(&self) -> &str {
        "live"
    }

    async fn fetch(&self, city: CityId) -> Result<Option<PartialReading>, ExtractionError> {
        let page = self.load_page(city).await?;
        let mut reading = extract_reading(&page, Utc::now());
        if reading.is_empty() {
            return Ok(None);
        }
        reading.source_label = Some(source_label(city.city().url));
        Ok(Some(reading))
    }
}

// ============================================================================
// Page parsing
// ============================================================================

/// Pulls whatever the selectors find out of a page.
pub fn extract_reading(html: &str, observed_at: DateTime<Utc>) -> PartialReading {
    let index = select_text(html, |t| {
        INDEX_CLASSES.iter().any(|c| t.has_class(c)) || t.attr_is(INDEX_ATTR.0, INDEX_ATTR.1)
    })
    .iter()
    .find_map(|text| leading_integer(text));

    let mut reading = PartialReading {
        index,
        observed_at: Some(observed_at),
        ..Default::default()
    };

    for text in select_text(html, |t| POLLUTANT_CLASSES.iter().any(|c| t.has_class(c))) {
        if let Some((pollutant, value)) = parse_pollutant(&text) {
            reading.pollutants.insert(pollutant, value);
        }
    }

    reading.advisory = select_text(html, |t| ADVISORY_CLASSES.iter().any(|c| t.has_class(c)))
        .into_iter()
        .find(|text| !text.is_empty());

    reading.sanitized()
}

/// Identifies the pollutant named in an element's text and the first number
/// that follows the label.
fn parse_pollutant(text: &str) -> Option<(Pollutant, f64)> {
    let lc = text.to_lowercase();
    POLLUTANT_LABELS.iter().find_map(|(pollutant, labels)| {
        labels.iter().find_map(|label| {
            let at = find_label(&lc, label)?;
            let value = first_number(&lc[at + label.len()..])?;
            Some((*pollutant, value))
        })
    })
}

/// Finds `label` as a standalone token: not preceded by a letter, and not
/// followed by a letter (digits after a label such as `pm10` are part of it).
fn find_label(haystack: &str, label: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = haystack[from..].find(label) {
        let at = from + rel;
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + label.len()..].chars().next();
        let standalone = before.is_none_or(|c| !c.is_alphabetic())
            && after.is_none_or(|c| !c.is_alphabetic());
        if standalone {
            return Some(at);
        }
        from = at + label.len();
    }
    None
}

/// "www.accuweather.com (live)" style provenance from a page URL.
fn source_label(url: &str) -> String {
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url);
    format!("{} (live)", host.trim_start_matches("www."))
}

// ============================================================================
// Tests
// ============================================================================
