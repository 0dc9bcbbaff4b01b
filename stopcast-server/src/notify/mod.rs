//! Outbound notification channels

pub mod push;
pub mod sms;

pub use push::{broadcast_body, BroadcastReport, PushClient, PushError};
pub use sms::{normalize_phone, normalize_recipients, validate_message, SmsClient, SmsError};
