//! Forecasting error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Model not trained or loaded")]
    ModelNotTrained,

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid training parameters: {0}")]
    InvalidParams(String),

    #[error("Feature vector has {found} values, model expects {expected}")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("Model produced a non-finite prediction")]
    NonFinitePrediction,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model artifact error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] stopcast_common::Error),
}
