//! Delivery to the downstream transfer agent.
//!
//! Every attempt yields an explicit [`DeliveryOutcome`]; failures are data,
//! so the drain engine decides on bounces by matching on the status.

pub mod smtp;

use std::fmt;

use async_trait::async_trait;

pub use smtp::{SmtpConfig, SmtpDeliverer};

/// Result classification of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Accepted by the transfer agent
    Delivered,
    /// The agent explicitly refused the recipient
    Rejected,
    /// Connection or protocol level failure
    TransportFailure,
    /// Anything else that went wrong during the attempt
    OtherFailure,
}

impl DeliveryStatus {
    /// Whether this outcome requires a failure report.
    pub fn needs_bounce(&self) -> bool {
        !matches!(self, DeliveryStatus::Delivered)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Rejected => "rejected",
            DeliveryStatus::TransportFailure => "transport_failure",
            DeliveryStatus::OtherFailure => "other_failure",
        };
        f.write_str(s)
    }
}

/// Outcome of delivering one message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub status: DeliveryStatus,
    pub detail: String,
}

impl DeliveryOutcome {
    pub fn delivered(recipient: &str, detail: impl Into<String>) -> Self {
        Self::new(recipient, DeliveryStatus::Delivered, detail)
    }

    pub fn new(recipient: &str, status: DeliveryStatus, detail: impl Into<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

/// Capability interface over the outbound transfer agent.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Deliver `raw` to a single recipient in its own session.
    ///
    /// `from` of `None` submits the null reverse path.
    async fn deliver(&self, from: Option<&str>, recipient: &str, raw: &[u8]) -> DeliveryOutcome;
}
