/// Structured logging for the air-quality monitoring service
///
/// Provides context-rich logging with city identifiers and the component
/// the event came from, on top of `tracing`. Supports console output and an
/// optional append-mode log file for daemon operation.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::cities::CityId;
use crate::model::ExtractionError;

// ---------------------------------------------------------------------------
// Log Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Extractor,
    Synthetic,
    Store,
    Scheduler,
    Notifier,
    Inbound,
    System,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Extractor => write!(f, "LIVE"),
            LogSource::Synthetic => write!(f, "SYNTH"),
            LogSource::Store => write!(f, "STORE"),
            LogSource::Scheduler => write!(f, "SCHED"),
            LogSource::Notifier => write!(f, "NOTIFY"),
            LogSource::Inbound => write!(f, "INBOUND"),
            LogSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - slow page or a page without readings
    Expected,
    /// Unexpected failure - transport or HTTP-level problem
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber: console output on stderr plus an optional
/// append-mode log file. Calling it twice is harmless; the second call is ignored.
pub fn init_logger(min_level: LevelFilter, log_file: Option<&str>, console_timestamps: bool) {
    let file_layer = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path, e);
                None
            }
        }
    });

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let console_layer = if console_timestamps {
        console_layer.boxed()
    } else {
        console_layer.without_time().boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(min_level)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// Parses a level name ("debug", "info", "warn", "error", "off").
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

fn city_field(city: Option<CityId>) -> &'static str {
    city.map(CityId::key).unwrap_or("-")
}

/// Log a general informational message
pub fn info(source: LogSource, city: Option<CityId>, message: &str) {
    tracing::info!(source = %source, city = city_field(city), "{}", message);
}

/// Log a warning message
pub fn warn(source: LogSource, city: Option<CityId>, message: &str) {
    tracing::warn!(source = %source, city = city_field(city), "{}", message);
}

/// Log an error message
pub fn error(source: LogSource, city: Option<CityId>, message: &str) {
    tracing::error!(source = %source, city = city_field(city), "{}", message);
}

/// Log a debug message
pub fn debug(source: LogSource, city: Option<CityId>, message: &str) {
    tracing::debug!(source = %source, city = city_field(city), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify an extraction failure based on the error kind
pub fn classify_extraction_failure(err: &ExtractionError) -> FailureType {
    match err {
        // Pages are slow or lay out the index differently from time to time
        ExtractionError::Timeout { .. } | ExtractionError::NoData(_) => FailureType::Expected,
        ExtractionError::HttpStatus(code) if *code >= 500 => FailureType::Unexpected,
        ExtractionError::HttpStatus(_) => FailureType::Unknown,
        ExtractionError::Http(e) if e.is_timeout() => FailureType::Expected,
        ExtractionError::Http(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log an extraction failure with automatic classification
pub fn log_extraction_failure(city: CityId, operation: &str, err: &ExtractionError) {
    let failure_type = classify_extraction_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(LogSource::Extractor, Some(city), &message),
        FailureType::Unexpected => error(LogSource::Extractor, Some(city), &message),
        FailureType::Unknown => warn(LogSource::Extractor, Some(city), &message),
    }
}

/// Log a storage failure; the current operation is abandoned by the caller
pub fn log_store_failure(city: Option<CityId>, operation: &str, err: &dyn std::error::Error) {
    error(LogSource::Store, city, &format!("{} failed: {}", operation, err));
}

// ---------------------------------------------------------------------------
// Cycle Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a polling cycle
pub fn log_cycle_summary(total: usize, live: usize, synthetic: usize, fallback: usize, failed: usize) {
    let message = format!(
        "Polling cycle complete: {}/{} persisted ({} live, {} synthetic, {} fallback), {} failed",
        live + synthetic + fallback,
        total,
        live,
        synthetic,
        fallback,
        failed
    );

    if failed == 0 && fallback == 0 {
        info(LogSource::Scheduler, None, &message);
    } else if total > 0 && failed == total {
        error(LogSource::Scheduler, None, &message);
    } else {
        warn(LogSource::Scheduler, None, &message);
    }
}
