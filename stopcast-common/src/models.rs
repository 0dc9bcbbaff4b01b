//! Entity models
//!
//! Row types returned by the query functions in [`crate::db`] and the
//! JSON shapes served by the HTTP API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::stops::StopType;

/// A fixed transit waiting point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
    pub stop_type: StopType,
}

/// Materialized demand forecast for one stop on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    pub stop_id: i64,
    pub stop_name: String,
    pub prediction_date: NaiveDate,
    pub predicted_passengers: i64,
    pub peak_hour: u32,
    pub confidence_score: f64,
    pub is_school_dismissal: bool,
    pub is_high_tide: bool,
    pub is_public_holiday: bool,
    pub is_weekend: bool,
    pub message: String,
    pub is_sent: bool,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Insert payload for a prediction row
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub stop_id: i64,
    pub prediction_date: NaiveDate,
    pub predicted_passengers: i64,
    pub peak_hour: u32,
    pub confidence_score: f64,
    pub is_school_dismissal: bool,
    pub is_high_tide: bool,
    pub is_public_holiday: bool,
    pub is_weekend: bool,
    pub message: String,
}

/// Registered notification recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNumber {
    pub id: i64,
    pub phone_number: String,
    /// Push token is never echoed back over the API
    #[serde(skip_serializing)]
    pub push_token: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Recorded accuracy of a trained model version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub id: i64,
    pub model_version: String,
    pub r2_score: f64,
    pub mae: f64,
    pub rmse: f64,
    pub training_date: DateTime<Utc>,
    pub is_active: bool,
}

/// Insert payload for model metrics
#[derive(Debug, Clone, PartialEq)]
pub struct NewModelMetrics {
    pub model_version: String,
    pub r2_score: f64,
    pub mae: f64,
    pub rmse: f64,
}
