//! Error types for stopcast-server
//!
//! Every handler returns [`ApiResult`]; failures become a JSON body of the
//! form `{"error": "<message>"}` with a matching HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use stopcast_forecast::ForecastError;

use crate::notify::{PushError, SmsError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Per-client rate limit exceeded (429)
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    TooManyRequests { retry_after: u64 },

    /// Outbound provider unreachable (502)
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Outbound provider did not answer in time (504)
    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    /// Outbound provider rejected the request; its status is passed through
    #[error("Provider error {status}: {message}")]
    Provider {
        status: StatusCode,
        message: String,
        details: Value,
    },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// stopcast-common error
    #[error("Common error: {0}")]
    Common(#[from] stopcast_common::Error),

    /// Forecast pipeline error
    #[error("Forecast error: {0}")]
    Forecast(#[from] ForecastError),
}

impl From<SmsError> for ApiError {
    fn from(err: SmsError) -> Self {
        match err {
            SmsError::NotConfigured => ApiError::Internal(
                "Semaphore API key not configured. Set SEMAPHORE_API_KEY in environment variables."
                    .to_string(),
            ),
            SmsError::Validation(msg) => ApiError::BadRequest(msg),
            SmsError::Timeout => {
                ApiError::GatewayTimeout("Request timed out. Please try again.".to_string())
            }
            SmsError::Network(msg) => ApiError::BadGateway(format!("Network error: {}", msg)),
            SmsError::Provider {
                status,
                message,
                details,
            } => ApiError::Provider {
                status: StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                message,
                details,
            },
            SmsError::Parse(msg) => {
                ApiError::BadGateway(format!("Invalid provider response: {}", msg))
            }
        }
    }
}

impl From<PushError> for ApiError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::NoRecipients => ApiError::BadRequest("No active users found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests { retry_after } => {
                let body = Json(json!({
                    "success": false,
                    "error": format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
                    "retry_after": retry_after,
                }));
                return (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Provider {
                status,
                message,
                details,
            } => {
                let body = Json(json!({
                    "success": false,
                    "error": message,
                    "details": details,
                }));
                return (status, body).into_response();
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Io(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Common(err) => common_status(err),
            ApiError::Forecast(ForecastError::Common(err)) => common_status(err),
            ApiError::Forecast(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", message);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn common_status(err: stopcast_common::Error) -> (StatusCode, String) {
    use stopcast_common::Error;

    match err {
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        Error::Conflict(msg) => (StatusCode::CONFLICT, msg),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_common_errors_map_to_statuses() {
        use stopcast_common::Error;

        assert_eq!(
            status_of(Error::NotFound("User 9".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::InvalidInput("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::Internal("boom".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_sms_errors_map_to_statuses() {
        assert_eq!(status_of(SmsError::NotConfigured.into()), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(SmsError::Timeout.into()), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_of(SmsError::Validation("empty".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                SmsError::Provider {
                    status: 401,
                    message: "Failed to send SMS".into(),
                    details: Value::Null,
                }
                .into()
            ),
            StatusCode::UNAUTHORIZED
        );
        // A non-error provider status is not passed through
        assert_eq!(
            status_of(
                SmsError::Provider {
                    status: 302,
                    message: "moved".into(),
                    details: Value::Null,
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_rate_limit_status() {
        assert_eq!(
            status_of(ApiError::TooManyRequests { retry_after: 12 }),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
