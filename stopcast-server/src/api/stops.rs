//! Stop listing

use axum::{extract::State, Json};

use stopcast_common::db::stops;
use stopcast_common::models::Stop;

use crate::error::ApiResult;
use crate::AppState;

/// GET /api/stops
pub async fn list_stops(State(state): State<AppState>) -> ApiResult<Json<Vec<Stop>>> {
    Ok(Json(stops::list_stops(&state.db).await?))
}
