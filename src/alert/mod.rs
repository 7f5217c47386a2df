//! Threshold evaluation, notification dispatch and staleness checks.

pub mod notify;
pub mod stalenesses;
pub mod thresholds;
