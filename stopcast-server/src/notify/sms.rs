//! Semaphore SMS gateway client
//!
//! Philippine mobile numbers only. Inputs are normalized to `639XXXXXXXXX`
//! before anything is sent; a request with any unrecognizable number is
//! rejected as a whole.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use stopcast_common::config::SmsConfig;

const USER_AGENT: &str = concat!("stopcast/", env!("CARGO_PKG_VERSION"));
const BALANCE_TIMEOUT_SECS: u64 = 10;

/// Longest message that still fits a single SMS
pub const MAX_MESSAGE_CHARS: usize = 160;
/// Provider cap on recipients per call
pub const MAX_RECIPIENTS: usize = 1000;

/// Delivery statuses that count as accepted by the gateway
const ACCEPTED_STATUSES: [&str; 3] = ["queued", "pending", "sent"];

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("Semaphore API key not configured")]
    NotConfigured,

    #[error("{0}")]
    Validation(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error {status}: {message}")]
    Provider {
        status: u16,
        message: String,
        details: Value,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SmsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SmsError::Timeout
        } else {
            SmsError::Network(e.to_string())
        }
    }
}

/// Canonical `639XXXXXXXXX` form of a Philippine mobile number
pub fn normalize_phone(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        12 if digits.starts_with("639") => Some(digits),
        11 if digits.starts_with("09") => Some(format!("63{}", &digits[1..])),
        10 if digits.starts_with('9') => Some(format!("63{}", digits)),
        _ => None,
    }
}

/// Normalize every recipient, rejecting the batch if any is invalid
pub fn normalize_recipients(numbers: &[String]) -> Result<Vec<String>, SmsError> {
    if numbers.is_empty() {
        return Err(SmsError::Validation("No phone numbers provided".to_string()));
    }
    if numbers.len() > MAX_RECIPIENTS {
        return Err(SmsError::Validation(format!(
            "Maximum {} recipients per request",
            MAX_RECIPIENTS
        )));
    }

    let mut valid = Vec::with_capacity(numbers.len());
    let mut invalid = Vec::new();
    for number in numbers {
        match normalize_phone(number) {
            Some(n) => valid.push(n),
            None => invalid.push(number.as_str()),
        }
    }

    if !invalid.is_empty() {
        return Err(SmsError::Validation(format!(
            "Invalid phone number format: {}. Use format: 639XXXXXXXXX",
            invalid.join(", ")
        )));
    }
    Ok(valid)
}

/// Trimmed message text, or why the gateway would refuse it
pub fn validate_message(message: &str) -> Result<String, SmsError> {
    let trimmed = message.trim();

    if trimmed.is_empty() {
        return Err(SmsError::Validation("Message cannot be empty".to_string()));
    }
    // The gateway silently drops these
    if trimmed.to_uppercase().starts_with("TEST") {
        return Err(SmsError::Validation(
            "Messages cannot start with \"TEST\" - Semaphore silently ignores them".to_string(),
        ));
    }
    let length = trimmed.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(SmsError::Validation(format!(
            "Message exceeds {} characters (current: {}). Please shorten your message.",
            MAX_MESSAGE_CHARS, length
        )));
    }
    Ok(trimmed.to_string())
}

/// Split a gateway response into (successful, failed) counts
///
/// A list carries one entry per recipient; anything else is treated as a
/// single acknowledgement for the whole batch.
pub fn count_results(response: &Value, recipients: usize) -> (usize, usize) {
    match response.as_array() {
        Some(entries) => entries.iter().fold((0, 0), |(ok, failed), entry| {
            let status = entry
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            if ACCEPTED_STATUSES.contains(&status.as_str()) {
                (ok + 1, failed)
            } else {
                (ok, failed + 1)
            }
        }),
        None => (recipients, 0),
    }
}

/// Best human-readable reason in a failed gateway response
fn provider_error_message(response: &Value) -> String {
    response
        .as_array()
        .and_then(|entries| entries.first())
        .filter(|first| first.get("status").and_then(Value::as_str) == Some("Failed"))
        .map(|first| {
            format!(
                "SMS failed: {}",
                first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
            )
        })
        .unwrap_or_else(|| "Failed to send SMS".to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct SendSummary {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub balance: Value,
    pub account_name: String,
    pub status: String,
}

#[derive(Serialize)]
struct SendForm<'a> {
    apikey: &'a str,
    number: String,
    message: &'a str,
    sendername: &'a str,
}

/// Semaphore API client
pub struct SmsClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_sender: String,
}

impl SmsClient {
    pub fn new(config: &SmsConfig) -> Result<Self, SmsError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SmsError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            default_sender: config.sender_name.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, SmsError> {
        self.api_key.as_deref().ok_or(SmsError::NotConfigured)
    }

    /// Send one message to already-normalized recipients
    pub async fn send(
        &self,
        recipients: &[String],
        message: &str,
        sender_name: Option<&str>,
    ) -> Result<SendSummary, SmsError> {
        let api_key = self.api_key()?;
        let form = SendForm {
            apikey: api_key,
            number: recipients.join(","),
            message,
            sendername: sender_name.unwrap_or(&self.default_sender),
        };

        info!(recipients = recipients.len(), "Sending SMS via Semaphore");

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| SmsError::Parse(e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            error!(status = status.as_u16(), response = %body, "Semaphore API error");
            return Err(SmsError::Provider {
                status: status.as_u16(),
                message: provider_error_message(&body),
                details: body,
            });
        }

        let (successful, failed) = count_results(&body, recipients.len());
        info!(successful, failed, "SMS sent");

        Ok(SendSummary {
            successful,
            failed,
            total: recipients.len(),
            details: body,
        })
    }

    /// Account credit balance
    pub async fn balance(&self) -> Result<AccountBalance, SmsError> {
        let api_key = self.api_key()?;

        let response = self
            .http_client
            .get(format!("{}/account", self.base_url))
            .query(&[("apikey", api_key)])
            .timeout(Duration::from_secs(BALANCE_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), response = %text, "Semaphore account lookup failed");
            return Err(SmsError::Provider {
                status: status.as_u16(),
                message: "Failed to fetch account balance".to_string(),
                details: Value::Null,
            });
        }

        let account: Value = response
            .json()
            .await
            .map_err(|e| SmsError::Parse(e.to_string()))?;

        let text_field = |name: &str| {
            account
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(AccountBalance {
            balance: account
                .get("credit_balance")
                .cloned()
                .unwrap_or_else(|| Value::from(0)),
            account_name: text_field("account_name"),
            status: text_field("status"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_phone_formats() {
        assert_eq!(normalize_phone("639171234567").as_deref(), Some("639171234567"));
        assert_eq!(normalize_phone("09171234567").as_deref(), Some("639171234567"));
        assert_eq!(normalize_phone("9171234567").as_deref(), Some("639171234567"));
        assert_eq!(normalize_phone("+63 917 123 4567").as_deref(), Some("639171234567"));
        assert_eq!(normalize_phone("0917-123-4567").as_deref(), Some("639171234567"));
    }

    #[test]
    fn test_normalize_phone_rejects_other_shapes() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("08171234567"), None);
        assert_eq!(normalize_phone("638171234567"), None);
        assert_eq!(normalize_phone("8171234567"), None);
    }

    #[test]
    fn test_normalize_recipients_lists_invalid_inputs() {
        let numbers = vec![
            "09171234567".to_string(),
            "abc".to_string(),
            "123".to_string(),
        ];
        match normalize_recipients(&numbers) {
            Err(SmsError::Validation(msg)) => {
                assert!(msg.contains("abc, 123"), "{}", msg);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_normalize_recipients_bounds() {
        assert!(normalize_recipients(&[]).is_err());

        let many = vec!["09171234567".to_string(); MAX_RECIPIENTS + 1];
        assert!(normalize_recipients(&many).is_err());

        let max = vec!["09171234567".to_string(); MAX_RECIPIENTS];
        assert_eq!(normalize_recipients(&max).unwrap().len(), MAX_RECIPIENTS);
    }

    #[test]
    fn test_validate_message() {
        assert_eq!(validate_message("  Hello riders  ").unwrap(), "Hello riders");
        assert!(validate_message("   ").is_err());
        assert!(validate_message("test broadcast").is_err());
        assert!(validate_message("  TESTING").is_err());
        assert!(validate_message("A test inside is fine").is_ok());

        let exact = "x".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_message(&exact).is_ok());
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(validate_message(&long).is_err());
    }

    #[test]
    fn test_message_length_counts_characters() {
        let accented = "ñ".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_message(&accented).is_ok());
    }

    #[test]
    fn test_count_results() {
        let response = json!([
            {"status": "Queued"},
            {"status": "Pending"},
            {"status": "sent"},
            {"status": "Failed"},
            {}
        ]);
        assert_eq!(count_results(&response, 5), (3, 2));
        assert_eq!(count_results(&json!({"message_id": 1}), 4), (4, 0));
    }

    #[test]
    fn test_provider_error_message() {
        let failed = json!([{"status": "Failed", "message": "Invalid sender name"}]);
        assert_eq!(provider_error_message(&failed), "SMS failed: Invalid sender name");
        assert_eq!(provider_error_message(&json!({"apikey": ["invalid"]})), "Failed to send SMS");
    }

    #[test]
    fn test_client_without_key_is_not_configured() {
        let client = SmsClient::new(&SmsConfig::default()).unwrap();
        assert!(!client.is_configured());

        let blank = SmsConfig {
            api_key: Some("  ".to_string()),
            ..SmsConfig::default()
        };
        assert!(!SmsClient::new(&blank).unwrap().is_configured());
    }
}
