/// Interpretation helpers for the monitoring service.
///
/// Submodules:
/// - `category`: maps an AQI value to its severity band and advice.

pub mod category;
