//! SNS notification types.

use serde::{Deserialize, Serialize};

/// Header carrying the notification type on every SNS HTTP delivery.
pub const MESSAGE_TYPE_HEADER: &str = "x-amz-sns-message-type";

/// Kind of an inbound SNS notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    SubscriptionConfirmation,
    UnsubscribeConfirmation,
    Notification,
    Unknown,
}

impl MessageType {
    /// Classify a raw header value. Anything unrecognized is `Unknown`.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("SubscriptionConfirmation") => MessageType::SubscriptionConfirmation,
            Some("UnsubscribeConfirmation") => MessageType::UnsubscribeConfirmation,
            Some("Notification") => MessageType::Notification,
            _ => MessageType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::SubscriptionConfirmation => "SubscriptionConfirmation",
            MessageType::UnsubscribeConfirmation => "UnsubscribeConfirmation",
            MessageType::Notification => "Notification",
            MessageType::Unknown => "Unknown",
        }
    }
}

/// SNS message body.
///
/// Every field is optional so that a well-formed JSON document always
/// deserializes; missing authenticity fields are rejected by the validator
/// rather than by the JSON gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnsMessage {
    #[serde(rename = "Type", default)]
    pub message_type: Option<String>,
    #[serde(rename = "MessageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "TopicArn", default)]
    pub topic_arn: Option<String>,
    #[serde(rename = "Subject", default)]
    pub subject: Option<String>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "Token", default)]
    pub token: Option<String>,
    #[serde(rename = "SubscribeURL", default)]
    pub subscribe_url: Option<String>,
    #[serde(rename = "UnsubscribeURL", default)]
    pub unsubscribe_url: Option<String>,
    #[serde(rename = "SignatureVersion", default)]
    pub signature_version: Option<String>,
    #[serde(rename = "Signature", default)]
    pub signature: Option<String>,
    #[serde(rename = "SigningCertURL", default)]
    pub signing_cert_url: Option<String>,
}
