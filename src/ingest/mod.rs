/// Turning readings into canonical per-city state.
///
/// Submodules:
/// - `merge`: field-wise merge of a partial reading into a stored record.
/// - `message`: inbound extraction messages and their city resolution.

pub mod merge;
pub mod message;
