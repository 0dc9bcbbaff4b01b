//! Prediction listing, regeneration and delivery

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use stopcast_common::db::{predictions, users};
use stopcast_common::models::Prediction;
use stopcast_common::time::{now, parse_date, today};

use crate::error::{ApiError, ApiResult};
use crate::jobs;
use crate::notify::broadcast_body;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DateParam {
    pub date: Option<String>,
}

/// GET /api/predictions
pub async fn all_predictions(State(state): State<AppState>) -> ApiResult<Json<Vec<Prediction>>> {
    Ok(Json(predictions::list_all(&state.db).await?))
}

/// GET /api/predictions/today
pub async fn today_predictions(State(state): State<AppState>) -> ApiResult<Json<Vec<Prediction>>> {
    Ok(Json(predictions::list_by_date(&state.db, today()).await?))
}

/// GET /api/predictions/:date
pub async fn predictions_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> ApiResult<Json<Vec<Prediction>>> {
    let date = parse_date(&date)
        .map_err(|_| ApiError::BadRequest("Invalid date format. Use YYYY-MM-DD".to_string()))?;
    Ok(Json(predictions::list_by_date(&state.db, date).await?))
}

/// Date requested for a manual run: JSON body first, then query string
///
/// Missing or unparseable values fall back to today.
pub fn requested_date(body: &[u8], query: Option<&str>) -> NaiveDate {
    let from_body = serde_json::from_slice::<DateParam>(body)
        .ok()
        .and_then(|p| p.date);

    from_body
        .as_deref()
        .and_then(|d| parse_date(d).ok())
        .or_else(|| query.and_then(|d| parse_date(d).ok()))
        .unwrap_or_else(|| {
            if from_body.is_some() || query.is_some() {
                debug!("Ignoring invalid requested date, using today");
            }
            today()
        })
}

/// POST /api/predictions/generate
///
/// Accepts `{"date": "YYYY-MM-DD"}` or `?date=YYYY-MM-DD`.
pub async fn generate_predictions(
    State(state): State<AppState>,
    query: Option<Query<DateParam>>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let query_date = query.and_then(|Query(q)| q.date);
    let date = requested_date(&body, query_date.as_deref());

    let summary = jobs::regenerate_for_date(&state, date).await?;

    Ok(Json(json!({
        "success": true,
        "count": summary.count,
        "date": summary.date,
        "message": format!("Generated {} predictions successfully", summary.count),
    })))
}

/// POST /api/predictions/send
///
/// Pushes today's unsent predictions to every active registrant, then marks
/// them sent.
pub async fn send_predictions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let unsent = predictions::list_unsent_by_date(&state.db, today()).await?;
    if unsent.is_empty() {
        return Err(ApiError::BadRequest(
            "No unsent predictions found for today".to_string(),
        ));
    }

    let recipients = users::list_active(&state.db).await?;
    let report = state
        .push
        .broadcast(&recipients, &broadcast_body(&unsent))
        .await?;

    let ids: Vec<i64> = unsent.iter().map(|p| p.id).collect();
    predictions::mark_sent(&state.db, &ids, now()).await?;

    info!(
        predictions = ids.len(),
        users = report.users_count,
        "Marked predictions as sent"
    );

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Successfully sent {} predictions to {} users",
            ids.len(),
            report.users_count
        ),
        "users_count": report.users_count,
        "success_count": report.success_count,
        "failure_count": report.failure_count,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_requested_date_prefers_body() {
        assert_eq!(
            requested_date(br#"{"date": "2024-03-04"}"#, Some("2024-05-06")),
            date("2024-03-04")
        );
    }

    #[test]
    fn test_requested_date_falls_back_to_query() {
        assert_eq!(requested_date(b"", Some("2024-05-06")), date("2024-05-06"));
        assert_eq!(
            requested_date(br#"{"date": "not-a-date"}"#, Some("2024-05-06")),
            date("2024-05-06")
        );
        assert_eq!(requested_date(b"{}", Some("2024-05-06")), date("2024-05-06"));
    }

    #[test]
    fn test_requested_date_defaults_to_today() {
        assert_eq!(requested_date(b"", None), today());
        assert_eq!(requested_date(b"garbage", Some("06/05/2024")), today());
    }
}
