//! Pluggable reading sources.
//!
//! The scheduler asks a source for one city's reading at a time. Two
//! implementations exist: `live::LiveExtractor`, which loads the city's page
//! and scrapes it, and `synthetic::SyntheticSource`, which generates a
//! plausible reading around the city's baseline and stands in whenever the
//! live path yields nothing.

pub mod html;
pub mod live;
pub mod synthetic;

use std::future::Future;

use crate::cities::CityId;
use crate::model::{ExtractionError, PartialReading};

pub use live::LiveExtractor;
pub use synthetic::SyntheticSource;

pub trait ReadingSource: Send + Sync {
    /// Human-readable name used in logs and verification reports.
    fn name(&self) -> &str;

    /// Produces a reading for `city`. `Ok(None)` means the source ran but
    /// found nothing to report.
    fn fetch(
        &self,
        city: CityId,
    ) -> impl Future<Output = Result<Option<PartialReading>, ExtractionError>> + Send;
}
