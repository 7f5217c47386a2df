//! Air-quality monitoring service.
//!
//! Polls a fixed set of cities, merges partial readings into one durable
//! record per city, checks the records against user thresholds and raises
//! notifications.

pub mod alert;
pub mod analysis;
pub mod cities;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod settings;
pub mod source;
pub mod store;
pub mod verify;
