/// Synthetic readings for when live data is unavailable
///
/// Generates a reading around each city's registry baseline, optionally
/// jittered to imitate real variation. Used directly when live data is
/// switched off, and as the fallback whenever the live extractor times out,
/// fails, or finds nothing on the page.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ReadingSource;
use crate::cities::CityId;
use crate::model::{ExtractionError, PartialReading, Pollutant};

pub const SYNTHETIC_LABEL: &str = "synthetic fallback";

/// Configuration for synthetic reading generation
pub struct SyntheticSource {
    /// `None` generates the exact baseline every time.
    rng: Option<Mutex<StdRng>>,
}

impl SyntheticSource {
    /// Jittered readings seeded from the OS.
    pub fn new() -> Self {
        Self {
            rng: Some(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Jittered readings with a reproducible sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// The city baseline, unmodified.
    pub fn steady() -> Self {
        Self { rng: None }
    }

    /// Builds the reading for `city` as of `now`.
    pub fn generate(&self, city: CityId, now: DateTime<Utc>) -> PartialReading {
        let base = city.city().baseline;

        // Integer offsets in [lo, hi], co in [-0.15, 0.15)
        let offsets = match self.rng.as_ref().and_then(|m| m.lock().ok()) {
            Some(mut rng) => Offsets {
                index: rng.gen_range(-5..=4),
                pm2_5: f64::from(rng.gen_range(-2..=2_i32)),
                pm10: f64::from(rng.gen_range(-4..=3_i32)),
                no2: f64::from(rng.gen_range(-2..=1_i32)),
                o3: f64::from(rng.gen_range(-3..=2_i32)),
                so2: f64::from(rng.gen_range(-1..=0_i32)),
                co: rng.gen_range(-0.15..0.15),
            },
            None => Offsets::default(),
        };

        let mut reading = PartialReading {
            index: Some(base.index.saturating_add_signed(offsets.index)),
            source_label: Some(SYNTHETIC_LABEL.to_string()),
            observed_at: Some(now),
            ..Default::default()
        };
        let values = [
            (Pollutant::FineParticulate, base.pm2_5 + offsets.pm2_5),
            (Pollutant::CoarseParticulate, base.pm10 + offsets.pm10),
            (Pollutant::NitrogenDioxide, base.no2 + offsets.no2),
            (Pollutant::Ozone, base.o3 + offsets.o3),
            (Pollutant::SulfurDioxide, base.so2 + offsets.so2),
            (Pollutant::CarbonMonoxide, base.co + offsets.co),
        ];
        for (pollutant, value) in values {
            reading.pollutants.insert(pollutant, value.max(0.0));
        }
        reading
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Offsets {
    index: i32,
    pm2_5: f64,
    pm10: f64,
    no2: f64,
    o3: f64,
    so2: f64,
    co: f64,
}

impl ReadingSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch(&self, city: CityId) -> Result<Option<PartialReading>, ExtractionError> {
        Ok(Some(self.generate(city, Utc::now())))
    }
}
