//! Notification authenticity checks.
//!
//! The dispatcher only sees the [`NotificationValidator`] trait; the
//! production [`SnsValidator`] fetches signing certificates over HTTPS and
//! caches them per URL.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::signature::{
    is_valid_cert_url, is_valid_confirmation_url, string_to_sign, verify_signature,
    SignatureVersion,
};
use super::types::{MessageType, SnsMessage};

/// Reasons an inbound notification is refused.
///
/// The display strings double as the HTTP response reason.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid message type.")]
    InvalidMessageType,

    #[error("Invalid certificate URL.")]
    InvalidCertUrl,

    #[error("Invalid confirmation URL.")]
    InvalidConfirmationUrl,

    #[error("Unexpected signature version.")]
    UnsupportedSignatureVersion,

    #[error("Failed to verify signature.")]
    SignatureVerificationFailed,
}

/// Classifies and authenticates inbound notifications.
#[async_trait]
pub trait NotificationValidator: Send + Sync {
    /// Classify the message type header, refusing anything unrecognized.
    fn validate_message_type(&self, header: Option<&str>) -> Result<MessageType, ValidationError> {
        match MessageType::from_header(header) {
            MessageType::Unknown => Err(ValidationError::InvalidMessageType),
            message_type => Ok(message_type),
        }
    }

    /// Check certificate origin, signature version and signature.
    async fn validate_message(
        &self,
        message_type: MessageType,
        message: &SnsMessage,
    ) -> Result<(), ValidationError>;
}

/// Validator for real SNS deliveries.
#[derive(Clone)]
pub struct SnsValidator {
    client: Client,
    certificates: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl SnsValidator {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            certificates: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch a signing certificate, reusing a cached copy when present.
    async fn certificate(&self, cert_url: &str) -> Option<Arc<Vec<u8>>> {
        {
            let cache = self.certificates.read().await;
            if let Some(pem) = cache.get(cert_url) {
                return Some(Arc::clone(pem));
            }
        }

        let response = match self.client.get(cert_url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(cert_url = %cert_url, status = %r.status(), "sns_certificate_fetch_failed");
                return None;
            }
            Err(e) => {
                warn!(cert_url = %cert_url, error = %e, "sns_certificate_fetch_failed");
                return None;
            }
        };

        let pem = match response.bytes().await {
            Ok(b) => Arc::new(b.to_vec()),
            Err(e) => {
                warn!(cert_url = %cert_url, error = %e, "sns_certificate_read_failed");
                return None;
            }
        };

        info!(cert_url = %cert_url, pem_length = pem.len(), "sns_certificate_cached");

        self.certificates
            .write()
            .await
            .insert(cert_url.to_string(), Arc::clone(&pem));

        Some(pem)
    }
}

#[async_trait]
impl NotificationValidator for SnsValidator {
    async fn validate_message(
        &self,
        message_type: MessageType,
        message: &SnsMessage,
    ) -> Result<(), ValidationError> {
        let cert_url = message
            .signing_cert_url
            .as_deref()
            .filter(|url| is_valid_cert_url(url))
            .ok_or(ValidationError::InvalidCertUrl)?;

        let confirmation_url = match message_type {
            MessageType::SubscriptionConfirmation => message.subscribe_url.as_deref(),
            MessageType::UnsubscribeConfirmation => message.unsubscribe_url.as_deref(),
            _ => None,
        };
        if let Some(url) = confirmation_url {
            if !is_valid_confirmation_url(url) {
                warn!(url = %url, "sns_confirmation_url_rejected");
                return Err(ValidationError::InvalidConfirmationUrl);
            }
        }

        let version = SignatureVersion::parse(message.signature_version.as_deref())
            .ok_or(ValidationError::UnsupportedSignatureVersion)?;

        let canonical = string_to_sign(message_type, message)
            .ok_or(ValidationError::SignatureVerificationFailed)?;

        let signature = message
            .signature
            .as_deref()
            .ok_or(ValidationError::SignatureVerificationFailed)?;

        let pem = self
            .certificate(cert_url)
            .await
            .ok_or(ValidationError::SignatureVerificationFailed)?;

        if verify_signature(version, &pem, &canonical, signature) {
            Ok(())
        } else {
            Err(ValidationError::SignatureVerificationFailed)
        }
    }
}
