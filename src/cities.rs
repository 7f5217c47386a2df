/// City registry for the air-quality monitoring service.
///
/// Defines the closed set of monitored cities, in polling order, along with
/// their display names, canonical air-quality page URLs, the URL path tokens
/// used to attribute inbound readings, and the baseline values the synthetic
/// source generates around. This is the single source of truth for city
/// identity: other modules look cities up here rather than matching URLs or
/// names on their own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// City identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CityId {
    Lipetsk,
    Moscow,
    Petersburg,
}

impl CityId {
    /// Storage key prefix and CLI name.
    pub fn key(self) -> &'static str {
        match self {
            CityId::Lipetsk => "lipetsk",
            CityId::Moscow => "moscow",
            CityId::Petersburg => "petersburg",
        }
    }

    pub fn city(self) -> &'static City {
        // Every variant has exactly one registry entry (checked in tests).
        CITY_REGISTRY
            .iter()
            .find(|c| c.id == self)
            .unwrap_or(&CITY_REGISTRY[0])
    }

    pub fn name(self) -> &'static str {
        self.city().name
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for CityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CITY_REGISTRY
            .iter()
            .find(|c| c.id.key() == wanted)
            .map(|c| c.id)
            .ok_or_else(|| format!("unknown city '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// City metadata
// ---------------------------------------------------------------------------

/// Typical values for a city, used by the synthetic source.
#[derive(Debug, Clone, Copy)]
pub struct Baseline {
    pub index: u32,
    pub pm2_5: f64,
    pub pm10: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub co: f64,
}

/// Metadata for a single monitored city.
pub struct City {
    pub id: CityId,
    /// Display name used in notifications and status output.
    pub name: &'static str,
    /// Canonical air-quality page polled by the live extractor.
    pub url: &'static str,
    /// Path segments that identify this city in a page URL.
    pub url_tokens: &'static [&'static str],
    /// Monitoring station shown alongside the record.
    pub station: &'static str,
    pub area: &'static str,
    pub baseline: Baseline,
}

/// All monitored cities, in polling order.
pub static CITY_REGISTRY: &[City] = &[
    City {
        id: CityId::Lipetsk,
        name: "Lipetsk",
        url: "https://www.accuweather.com/ru/ru/lipetsk/293886/air-quality-index/293886",
        url_tokens: &["lipetsk"],
        station: "Lipetsk monitoring",
        area: "Central district",
        baseline: Baseline {
            index: 57,
            pm2_5: 25.0,
            pm10: 45.0,
            no2: 12.0,
            o3: 28.0,
            so2: 4.0,
            co: 0.8,
        },
    },
    City {
        id: CityId::Moscow,
        name: "Moscow",
        url: "https://www.accuweather.com/ru/ru/moscow/294021/air-quality-index/294021",
        url_tokens: &["moscow", "moskva"],
        station: "Moscow centre",
        area: "Central okrug",
        baseline: Baseline {
            index: 42,
            pm2_5: 18.0,
            pm10: 35.0,
            no2: 25.0,
            o3: 35.0,
            so2: 3.0,
            co: 0.6,
        },
    },
    City {
        id: CityId::Petersburg,
        name: "Saint Petersburg",
        url: "https://www.accuweather.com/ru/ru/saint-petersburg/295212/air-quality-index/295212",
        url_tokens: &["saint-petersburg", "petersburg", "sankt-peterburg"],
        station: "SPb ecology",
        area: "Vasilyevsky Island",
        baseline: Baseline {
            index: 35,
            pm2_5: 15.0,
            pm10: 28.0,
            no2: 18.0,
            o3: 42.0,
            so2: 2.0,
            co: 0.5,
        },
    },
];

/// City ids in polling order.
pub fn all_city_ids() -> Vec<CityId> {
    CITY_REGISTRY.iter().map(|c| c.id).collect()
}

/// The city selected when no selection has been stored.
pub fn default_city() -> CityId {
    CITY_REGISTRY[0].id
}

// ---------------------------------------------------------------------------
// URL resolution
// ---------------------------------------------------------------------------

/// Resolves the city a page URL belongs to.
///
/// A URL matches when it equals or extends a city's canonical URL, or when
/// one of its path segments is exactly one of the city's declared tokens.
/// Returns `None` when nothing matches.
pub fn resolve_city_from_url(url: &str) -> Option<CityId> {
    let normalized = strip_scheme(url.trim());

    if let Some(city) = CITY_REGISTRY.iter().find(|c| {
        let canonical = strip_scheme(c.url);
        normalized == canonical
            || normalized
                .strip_prefix(canonical)
                .is_some_and(|rest| rest.starts_with(['/', '?', '#']))
    }) {
        return Some(city.id);
    }

    let path = normalized
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let segments: Vec<&str> = path.split('/').skip(1).collect();

    CITY_REGISTRY
        .iter()
        .find(|c| c.url_tokens.iter().any(|t| segments.contains(t)))
        .map(|c| c.id)
}

fn strip_scheme(url: &str) -> &str {
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    url.strip_prefix("www.").unwrap_or(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
