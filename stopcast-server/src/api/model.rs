//! Model metrics and retraining

use axum::{extract::State, Json};
use serde_json::{json, Value};

use stopcast_common::db::metrics;

use crate::error::ApiResult;
use crate::jobs::{self, TrainingReport};
use crate::AppState;

/// GET /api/model/metrics
///
/// The active metrics row, or `{}` when no model has been trained.
pub async fn model_metrics(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let body = match metrics::get_active(&state.db).await? {
        Some(active) => json!(active),
        None => json!({}),
    };
    Ok(Json(body))
}

/// POST /api/model/train
pub async fn train_model(State(state): State<AppState>) -> ApiResult<Json<TrainingReport>> {
    Ok(Json(jobs::train_and_deploy(&state).await?))
}
