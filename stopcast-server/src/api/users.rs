//! Registrant management

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use stopcast_common::db::users::{self, Registration};
use stopcast_common::models::UserNumber;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub phone_number: Option<String>,
    pub push_token: Option<String>,
}

/// GET /api/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserNumber>>> {
    Ok(Json(users::list_active(&state.db).await?))
}

/// POST /api/users
///
/// Re-adding a deactivated number reactivates it; an active duplicate is
/// rejected with 400.
pub async fn add_user(
    State(state): State<AppState>,
    payload: Option<Json<AddUserRequest>>,
) -> ApiResult<Json<Value>> {
    let phone_number = payload
        .and_then(|Json(p)| p.phone_number)
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Phone number is required".to_string()))?;

    let registration = users::register(&state.db, &phone_number)
        .await
        .map_err(|e| match e {
            stopcast_common::Error::Conflict(msg) => ApiError::BadRequest(msg),
            other => other.into(),
        })?;

    let body = match registration {
        Registration::Created(user) => {
            info!(user_id = user.id, "Registered new user");
            json!({ "success": true, "user": user })
        }
        Registration::Reactivated(user) => {
            info!(user_id = user.id, "Reactivated user");
            json!({ "success": true, "user": user, "message": "User reactivated" })
        }
    };
    Ok(Json(body))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    users::deactivate(&state.db, id).await?;
    let user = users::get(&state.db, id).await?;
    info!(user_id = id, "Deactivated user");

    Ok(Json(json!({
        "success": true,
        "message": "User deactivated successfully",
        "user": user,
    })))
}

/// POST /api/users/token
///
/// Registers or replaces a device push token; unknown numbers are created.
pub async fn register_push_token(
    State(state): State<AppState>,
    payload: Option<Json<PushTokenRequest>>,
) -> ApiResult<Json<Value>> {
    let (phone_number, push_token) = match payload {
        Some(Json(PushTokenRequest {
            phone_number: Some(phone),
            push_token: Some(token),
        })) => (phone, token),
        _ => {
            return Err(ApiError::BadRequest(
                "phone_number and push_token are required".to_string(),
            ))
        }
    };

    let user = users::set_push_token(&state.db, &phone_number, &push_token).await?;
    info!(user_id = user.id, "Push token updated");

    Ok(Json(json!({ "success": true, "user": user })))
}
