//! Dashboard summary

use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::Serialize;

use stopcast_common::db::{metrics, predictions, users};
use stopcast_common::models::{ModelMetrics, Prediction};
use stopcast_common::time::today;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub today: NaiveDate,
    pub predictions: Vec<Prediction>,
    pub users_count: i64,
    pub model_metrics: Option<ModelMetrics>,
    pub sent_count: i64,
    /// A trained model is loaded (otherwise predictions are heuristic)
    pub model_loaded: bool,
}

/// GET /api/dashboard
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardResponse>> {
    let today = today();

    Ok(Json(DashboardResponse {
        today,
        predictions: predictions::list_by_date(&state.db, today).await?,
        users_count: users::count_active(&state.db).await?,
        model_metrics: metrics::get_active(&state.db).await?,
        sent_count: predictions::count_sent_by_date(&state.db, today).await?,
        model_loaded: state.current_model().await.is_some(),
    }))
}
