//! Data Source Verification Module
//!
//! Runs every configured reading source once per city and reports which
//! cities are actually producing data. Nothing is persisted and no
//! notifications are sent.
//!
//! Use this after changing a city URL or the page selectors.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cities::{self, CityId};
use crate::model::{ExtractionError, PartialReading, Pollutant};
use crate::source::ReadingSource;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub results: Vec<CityVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub live_working: usize,
    pub live_failed: usize,
    pub synthetic_working: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityVerification {
    pub city: CityId,
    pub name: String,
    pub url: String,
    pub status: VerificationStatus,
    pub index_found: bool,
    pub pollutants_found: Vec<Pollutant>,
    pub pollutants_missing: Vec<Pollutant>,
    pub advisory_found: bool,
    pub synthetic_ok: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    /// Index and every pollutant extracted.
    Success,
    /// Page loaded and something was extracted, but not everything.
    PartialSuccess,
    Failed,
}

// ============================================================================
// City Verification
// ============================================================================

pub async fn verify_city<L, F>(
    live: &L,
    synthetic: &F,
    city: CityId,
    timeout: Duration,
) -> CityVerification
where
    L: ReadingSource,
    F: ReadingSource,
{
    let meta = city.city();
    let mut result = CityVerification {
        city,
        name: meta.name.to_string(),
        url: meta.url.to_string(),
        status: VerificationStatus::Failed,
        index_found: false,
        pollutants_found: Vec::new(),
        pollutants_missing: Pollutant::ALL.to_vec(),
        advisory_found: false,
        synthetic_ok: false,
        error_message: None,
    };

    // Test 1: live extraction within the page-load timeout
    let live_outcome = match tokio::time::timeout(timeout, live.fetch(city)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ExtractionError::Timeout { city, secs: timeout.as_secs() }),
    };
    match live_outcome {
        Ok(Some(reading)) => apply_reading(&mut result, &reading),
        Ok(None) => result.error_message = Some(ExtractionError::NoData(city).to_string()),
        Err(e) => result.error_message = Some(e.to_string()),
    }

    // Test 2: the fallback always has something to offer
    result.synthetic_ok = matches!(
        synthetic.fetch(city).await,
        Ok(Some(ref reading)) if reading.index.is_some()
    );

    result
}

fn apply_reading(result: &mut CityVerification, reading: &PartialReading) {
    result.index_found = reading.index.is_some();
    result.advisory_found = reading.advisory.is_some();
    result.pollutants_found = reading.pollutants.keys().copied().collect();
    result
        .pollutants_missing
        .retain(|p| !reading.pollutants.contains_key(p));

    result.status = if result.index_found && result.pollutants_missing.is_empty() {
        VerificationStatus::Success
    } else if reading.is_empty() {
        VerificationStatus::Failed
    } else {
        VerificationStatus::PartialSuccess
    };
}

// ============================================================================
// Full Verification
// ============================================================================

pub async fn run_verification<L, F>(live: &L, synthetic: &F, timeout: Duration) -> VerificationReport
where
    L: ReadingSource,
    F: ReadingSource,
{
    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        results: Vec::new(),
        summary: VerificationSummary::default(),
    };

    eprintln!("\n🔍 Verifying city pages ({} source)...", live.name());
    for city in cities::all_city_ids() {
        eprint!("  {} ... ", city.name());
        let result = verify_city(live, synthetic, city, timeout).await;
        report.summary.total += 1;

        match result.status {
            VerificationStatus::Success => {
                eprintln!("✓ OK (AQI and {} pollutants)", result.pollutants_found.len());
                report.summary.live_working += 1;
            }
            VerificationStatus::PartialSuccess => {
                eprintln!("⚠ Partial (missing: {:?})", result.pollutants_missing);
                report.summary.live_working += 1;
            }
            VerificationStatus::Failed => {
                eprintln!("✗ FAILED: {}", result.error_message.as_deref().unwrap_or("Unknown"));
                report.summary.live_failed += 1;
            }
        }
        if result.synthetic_ok {
            report.summary.synthetic_working += 1;
        }

        report.results.push(result);
    }

    report
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!(
        "Live pages:       {}/{} working  ({} failed)",
        report.summary.live_working, report.summary.total, report.summary.live_failed
    );
    println!(
        "Synthetic:        {}/{} ready",
        report.summary.synthetic_working, report.summary.total
    );
    println!();

    let success_rate = if report.summary.total > 0 {
        (report.summary.live_working as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Live Success Rate: {:.1}% ({}/{})",
        success_rate, report.summary.live_working, report.summary.total
    );
    println!("═══════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SyntheticSource;

    struct FixedSource(Option<PartialReading>);

    impl ReadingSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _city: CityId) -> Result<Option<PartialReading>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_full_reading_is_success() {
        let full = SyntheticSource::steady().generate(CityId::Moscow, Utc::now());
        let result = verify_city(
            &FixedSource(Some(full)),
            &SyntheticSource::steady(),
            CityId::Moscow,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.status, VerificationStatus::Success);
        assert!(result.pollutants_missing.is_empty());
        assert!(result.synthetic_ok);
    }

    #[tokio::test]
    async fn test_index_only_is_partial() {
        let reading = PartialReading { index: Some(70), ..Default::default() };
        let result = verify_city(
            &FixedSource(Some(reading)),
            &SyntheticSource::steady(),
            CityId::Lipetsk,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.status, VerificationStatus::PartialSuccess);
        assert_eq!(result.pollutants_missing.len(), 6);
    }

    #[tokio::test]
    async fn test_no_data_fails_with_message() {
        let result = verify_city(
            &FixedSource(None),
            &SyntheticSource::steady(),
            CityId::Petersburg,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(result.error_message.unwrap().contains("No data"));
    }
}
