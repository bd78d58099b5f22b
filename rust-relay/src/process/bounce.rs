//! Failure reports for undeliverable messages.
//!
//! A bounce is a `multipart/mixed` message to the operator mailbox: a short
//! text part naming the recipient and cause, and the original message
//! attached as `message/rfc822` in 8bit. Originals that cannot travel as
//! 8bit (NUL bytes, overlong lines) are attached as
//! `application/octet-stream` instead, since `message/rfc822` may not be
//! base64 encoded.

use lettre::message::header::{ContentDisposition, ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use thiserror::Error;
use tracing::{error, info};

use crate::delivery::{Deliverer, DeliveryStatus};
use crate::process::ParsedMessage;

const FALLBACK_ATTACHMENT_NAME: &str = "message";
const MAX_ATTACHMENT_STEM: usize = 100;

#[derive(Debug, Error)]
pub enum BounceError {
    #[error("invalid attachment content type: {0}")]
    ContentType(String),

    #[error("failed to build bounce: {0}")]
    Build(#[from] lettre::error::Error),
}

/// Failure report for one recipient of one stored message.
#[derive(Debug, Clone)]
pub struct BounceReport {
    pub original_sender: Option<String>,
    pub original_subject: Option<String>,
    pub recipient: String,
    pub detail: String,
    pub original: Vec<u8>,
}

impl BounceReport {
    /// `message` is `None` when the stored object could not be parsed.
    pub fn new(
        message: Option<&ParsedMessage>,
        original: &[u8],
        recipient: &str,
        detail: &str,
    ) -> Self {
        Self {
            original_sender: message.and_then(|m| m.envelope_from.clone()),
            original_subject: message.and_then(|m| m.subject.clone()),
            recipient: recipient.to_string(),
            detail: detail.to_string(),
            original: original.to_vec(),
        }
    }

    fn sender_display(&self) -> &str {
        self.original_sender.as_deref().unwrap_or("<>")
    }

    pub fn subject_line(&self) -> String {
        format!("Undeliverable message from {}", self.sender_display())
    }

    /// File name for the attached original, derived from its subject.
    pub fn attachment_name(&self) -> String {
        let stem: String = self
            .original_subject
            .as_deref()
            .unwrap_or_default()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .take(MAX_ATTACHMENT_STEM)
            .collect();

        let stem = stem.trim().trim_matches('.');
        if stem.is_empty() {
            format!("{FALLBACK_ATTACHMENT_NAME}.eml")
        } else {
            format!("{stem}.eml")
        }
    }

    pub fn body(&self) -> String {
        format!(
            "The relay could not deliver the attached message.\n\
             \n\
             Sender:    {}\n\
             Recipient: {}\n\
             Subject:   {}\n\
             \n\
             Cause: {}\n",
            self.sender_display(),
            self.recipient,
            self.original_subject.as_deref().unwrap_or("(none)"),
            self.detail,
        )
    }

    /// Render the report as a complete message from and to `postmaster`.
    pub fn to_message(&self, postmaster: &Mailbox) -> Result<Vec<u8>, BounceError> {
        let message = Message::builder()
            .from(postmaster.clone())
            .to(postmaster.clone())
            .subject(self.subject_line())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(self.body()))
                    .singlepart(self.original_part()?),
            )?;

        Ok(message.formatted())
    }

    fn original_part(&self) -> Result<SinglePart, BounceError> {
        let name = self.attachment_name();

        match Body::new_with_encoding(self.original.clone(), ContentTransferEncoding::EightBit) {
            Ok(body) => {
                let rfc822 = ContentType::parse("message/rfc822")
                    .map_err(|e| BounceError::ContentType(e.to_string()))?;
                Ok(SinglePart::builder()
                    .header(rfc822)
                    .header(ContentDisposition::attachment(&name))
                    .body(body))
            }
            Err(raw) => {
                let binary = ContentType::parse("application/octet-stream")
                    .map_err(|e| BounceError::ContentType(e.to_string()))?;
                Ok(Attachment::new(name).body(raw, binary))
            }
        }
    }
}

/// Send a bounce to the operator mailbox.
///
/// Failures are logged and swallowed; a bounce is never bounced.
/// Returns whether the report was accepted by the transfer agent.
pub async fn send_bounce(
    deliverer: &dyn Deliverer,
    postmaster: &Mailbox,
    report: &BounceReport,
) -> bool {
    let message = match report.to_message(postmaster) {
        Ok(m) => m,
        Err(e) => {
            error!(recipient = %report.recipient, error = %e, "bounce_build_failed");
            return false;
        }
    };

    let address = postmaster.email.to_string();
    let outcome = deliverer.deliver(Some(address.as_str()), &address, &message).await;

    if outcome.status == DeliveryStatus::Delivered {
        info!(
            recipient = %report.recipient,
            postmaster = %address,
            bounce_length = message.len(),
            "bounce_sent"
        );
        true
    } else {
        error!(
            recipient = %report.recipient,
            postmaster = %address,
            status = ?outcome.status,
            detail = %outcome.detail,
            "bounce_send_failed"
        );
        false
    }
}
