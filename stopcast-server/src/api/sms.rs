//! SMS broadcast through the Semaphore gateway
//!
//! Both endpoints are throttled per client address with the sliding-window
//! limiter; limits come from `[sms]` in the config.

use axum::{
    extract::{ConnectInfo, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::notify::{normalize_recipients, validate_message, SmsError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    #[serde(default)]
    pub numbers: Vec<Value>,
    #[serde(default)]
    pub message: String,
    pub sender_name: Option<String>,
}

fn client_key(scope: &str, client: Option<ConnectInfo<SocketAddr>>) -> String {
    let address = client
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}:{}", scope, address)
}

fn enforce_limit(state: &AppState, key: &str, limit: usize) -> ApiResult<()> {
    let window = Duration::from_secs(state.config.sms.window_secs);
    state
        .rate_limiter
        .check(key, limit, window)
        .map_err(|retry_after| {
            warn!(client = key, retry_after, "Rate limit exceeded");
            ApiError::TooManyRequests { retry_after }
        })
}

/// JSON numbers and strings are both accepted as phone numbers
fn number_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// POST /api/sms/send
pub async fn send_sms(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<SendSmsRequest>>,
) -> ApiResult<Json<Value>> {
    enforce_limit(&state, &client_key("sms_send", client), state.config.sms.send_limit)?;

    if !state.sms.is_configured() {
        return Err(SmsError::NotConfigured.into());
    }

    let Json(request) =
        payload.ok_or_else(|| ApiError::BadRequest("No data provided".to_string()))?;

    if request.numbers.is_empty() {
        return Err(ApiError::BadRequest("No phone numbers provided".to_string()));
    }
    let message = validate_message(&request.message)?;

    let numbers: Vec<String> = request.numbers.iter().map(number_text).collect();
    let recipients = normalize_recipients(&numbers)?;

    let summary = state
        .sms
        .send(&recipients, &message, request.sender_name.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "successful": summary.successful,
        "failed": summary.failed,
        "total": summary.total,
        "message": format!("SMS sent to {} recipient(s)", summary.successful),
        "details": summary.details,
    })))
}

/// GET /api/sms/balance
pub async fn sms_balance(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<Json<Value>> {
    enforce_limit(
        &state,
        &client_key("sms_balance", client),
        state.config.sms.balance_limit,
    )?;

    let account = state.sms.balance().await?;

    Ok(Json(json!({
        "success": true,
        "balance": account.balance,
        "account_name": account.account_name,
        "status": account.status,
    })))
}
