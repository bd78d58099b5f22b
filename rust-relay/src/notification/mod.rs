//! Inbound SNS notifications.
//!
//! This module provides:
//! - The notification body and type classification
//! - Signature verification against the SNS signing certificate
//! - The validator capability used by the webhook dispatcher

pub mod signature;
pub mod types;
pub mod validator;

pub use signature::{
    is_valid_cert_url, is_valid_confirmation_url, string_to_sign, verify_signature,
    SignatureVersion,
};
pub use types::{MessageType, SnsMessage, MESSAGE_TYPE_HEADER};
pub use validator::{NotificationValidator, SnsValidator, ValidationError};
