//! # stopcast forecasting
//!
//! Passenger-demand forecasting for the stop network:
//! - Calendar and demand-history features ([`features`])
//! - Seeded synthetic demand data ([`generator`]) and its CSV form ([`dataset`])
//! - Gradient-boosted regression trees ([`gbm`]) wrapped as a versioned
//!   model artifact ([`model`])
//! - Training with hold-out evaluation ([`training`], [`metrics`])
//! - Per-stop peak-hour prediction with a rule-based fallback ([`predictor`])

pub mod dataset;
pub mod error;
pub mod features;
pub mod gbm;
pub mod generator;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod training;

pub use error::{ForecastError, Result};
pub use features::{CalendarFeatures, DemandHistory, FeatureVector, FEATURE_COLUMNS};
pub use model::{DemandModel, ForecastModel};
pub use predictor::{forecast_stop, ForecastSource, StopForecast};
