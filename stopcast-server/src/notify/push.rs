//! Firebase Cloud Messaging (HTTP v1) client

use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use stopcast_common::config::PushConfig;
use stopcast_common::models::{Prediction, UserNumber};

const USER_AGENT: &str = concat!("stopcast/", env!("CARGO_PKG_VERSION"));

/// Predictions included in one broadcast body
pub const BROADCAST_PREDICTIONS: usize = 5;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push notifications not configured")]
    NotConfigured,

    #[error("No active users found")]
    NoRecipients,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("FCM error {0}: {1}")]
    ApiError(u16, String),
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub users_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

/// Messages of the first few predictions, separated by blank lines
pub fn broadcast_body(predictions: &[Prediction]) -> String {
    predictions
        .iter()
        .take(BROADCAST_PREDICTIONS)
        .map(|p| p.message.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// FCM HTTP v1 client
pub struct PushClient {
    http_client: reqwest::Client,
    endpoint: Option<String>,
    access_token: Option<String>,
    title: String,
}

impl PushClient {
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PushError::NetworkError(e.to_string()))?;

        let endpoint = config.project_id.as_ref().map(|project| {
            format!(
                "{}/projects/{}/messages:send",
                config.endpoint_base.trim_end_matches('/'),
                project
            )
        });

        Ok(Self {
            http_client,
            endpoint,
            access_token: config.access_token.clone(),
            title: config.title.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.access_token.is_some()
    }

    /// Deliver one notification to a device token
    pub async fn send_to_token(&self, token: &str, body: &str) -> Result<(), PushError> {
        let (endpoint, access_token) = match (&self.endpoint, &self.access_token) {
            (Some(endpoint), Some(access_token)) => (endpoint, access_token),
            _ => return Err(PushError::NotConfigured),
        };

        let payload = json!({
            "message": {
                "token": token,
                "notification": {
                    "title": self.title,
                    "body": body,
                },
                "data": {
                    "timestamp": chrono::Local::now().to_rfc3339(),
                    "type": "passenger_forecast",
                },
            }
        });

        let response = self
            .http_client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PushError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PushError::ApiError(status.as_u16(), error_text));
        }

        debug!("Push message accepted by FCM");
        Ok(())
    }

    /// Send `body` to every registrant
    ///
    /// Registrants without a push token are logged and counted as delivered.
    pub async fn broadcast(
        &self,
        users: &[UserNumber],
        body: &str,
    ) -> Result<BroadcastReport, PushError> {
        if users.is_empty() {
            return Err(PushError::NoRecipients);
        }
        if !self.is_configured() {
            warn!("Push notifications not configured; token deliveries will fail");
        }

        let mut report = BroadcastReport {
            users_count: users.len(),
            success_count: 0,
            failure_count: 0,
        };

        for user in users {
            match user.push_token.as_deref().filter(|t| !t.is_empty()) {
                Some(token) => match self.send_to_token(token, body).await {
                    Ok(()) => report.success_count += 1,
                    Err(e) => {
                        error!(user_id = user.id, error = %e, "Push delivery failed");
                        report.failure_count += 1;
                    }
                },
                None => {
                    info!(phone = %user.phone_number, "No push token; would send: {}", body);
                    report.success_count += 1;
                }
            }
        }

        info!(
            users = report.users_count,
            success = report.success_count,
            failed = report.failure_count,
            "Broadcast complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn prediction(id: i64, message: &str) -> Prediction {
        Prediction {
            id,
            stop_id: id,
            stop_name: format!("Stop {}", id),
            prediction_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            predicted_passengers: 20,
            peak_hour: 7,
            confidence_score: 0.95,
            is_school_dismissal: false,
            is_high_tide: false,
            is_public_holiday: false,
            is_weekend: false,
            message: message.to_string(),
            is_sent: false,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    fn user(id: i64, token: Option<&str>) -> UserNumber {
        UserNumber {
            id,
            phone_number: format!("0917000000{}", id),
            push_token: token.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_broadcast_body_takes_first_five() {
        let predictions: Vec<_> = (1..=7).map(|i| prediction(i, &format!("m{}", i))).collect();
        assert_eq!(broadcast_body(&predictions), "m1\n\nm2\n\nm3\n\nm4\n\nm5");
        assert_eq!(broadcast_body(&predictions[..1]), "m1");
        assert_eq!(broadcast_body(&[]), "");
    }

    #[test]
    fn test_endpoint_from_config() {
        let client = PushClient::new(&PushConfig {
            project_id: Some("demo-project".to_string()),
            access_token: Some("token".to_string()),
            ..PushConfig::default()
        })
        .unwrap();
        assert!(client.is_configured());
        assert_eq!(
            client.endpoint.as_deref(),
            Some("https://fcm.googleapis.com/v1/projects/demo-project/messages:send")
        );
    }

    #[tokio::test]
    async fn test_broadcast_requires_recipients() {
        let client = PushClient::new(&PushConfig::default()).unwrap();
        assert!(matches!(
            client.broadcast(&[], "hello").await,
            Err(PushError::NoRecipients)
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_broadcast_counts_token_failures() {
        let client = PushClient::new(&PushConfig::default()).unwrap();
        let users = vec![user(1, None), user(2, Some("device-token")), user(3, Some(""))];

        let report = client.broadcast(&users, "hello").await.unwrap();
        assert_eq!(
            report,
            BroadcastReport {
                users_count: 3,
                success_count: 2,
                failure_count: 1,
            }
        );
    }
}
