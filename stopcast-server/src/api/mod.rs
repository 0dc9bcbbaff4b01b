//! HTTP API handlers for stopcast-server

pub mod dashboard;
pub mod health;
pub mod model;
pub mod predictions;
pub mod sms;
pub mod stops;
pub mod ui;
pub mod uploads;
pub mod users;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub use dashboard::dashboard;
pub use health::health_routes;
pub use model::{model_metrics, train_model};
pub use predictions::{
    all_predictions, generate_predictions, predictions_by_date, send_predictions,
    today_predictions,
};
pub use sms::{send_sms, sms_balance};
pub use stops::list_stops;
pub use ui::serve_index;
pub use uploads::upload_profile_photo;
pub use users::{add_user, delete_user, list_users, register_push_token};

/// Fallback for unknown routes
pub async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
