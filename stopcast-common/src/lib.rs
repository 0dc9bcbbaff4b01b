//! # stopcast common library
//!
//! Shared code for the stopcast service and forecasting crates:
//! - Configuration loading (TOML file, environment secrets, defaults)
//! - SQLite schema initialization and queries
//! - Entity models (stops, predictions, registrants, model metrics)
//! - Fixed stop reference data
//! - Date/time helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod stops;
pub mod time;

pub use error::{Error, Result};
pub use stops::StopType;
