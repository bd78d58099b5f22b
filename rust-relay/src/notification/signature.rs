//! SNS message signature verification.
//!
//! SNS signs every HTTP delivery with an RSA key whose certificate is
//! published under `https://sns.<region>.amazonaws.com/`.
//! Reference: https://docs.aws.amazon.com/sns/latest/dg/sns-verify-signature-of-message.html

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::signature::{
    UnparsedPublicKey, VerificationAlgorithm, RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
    RSA_PKCS1_2048_8192_SHA256,
};
use tracing::warn;
use url::Url;

use super::types::{MessageType, SnsMessage};

/// Signature versions SNS may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVersion {
    /// RSA PKCS#1 v1.5 over SHA1
    V1,
    /// RSA PKCS#1 v1.5 over SHA256
    V2,
}

impl SignatureVersion {
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            Some("1") => Some(SignatureVersion::V1),
            Some("2") => Some(SignatureVersion::V2),
            _ => None,
        }
    }

    fn algorithm(&self) -> &'static dyn VerificationAlgorithm {
        match self {
            SignatureVersion::V1 => &RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            SignatureVersion::V2 => &RSA_PKCS1_2048_8192_SHA256,
        }
    }
}

/// Parse `raw` as an https URL on an SNS regional endpoint.
///
/// The host must be `sns.<region>.amazonaws.com[.cn]` with no explicit port
/// or user info.
fn sns_endpoint_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;

    if url.scheme() != "https" || url.port().is_some() || !url.username().is_empty() {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();

    let region = host
        .strip_prefix("sns.")
        .and_then(|rest| {
            rest.strip_suffix(".amazonaws.com")
                .or_else(|| rest.strip_suffix(".amazonaws.com.cn"))
        })
        .unwrap_or("");

    let region_ok = !region.is_empty()
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    region_ok.then_some(url)
}

/// Check that a signing certificate URL points at an SNS endpoint.
///
/// Accepts `https://sns.<region>.amazonaws.com[.cn]/<name>.pem` only.
pub fn is_valid_cert_url(cert_url: &str) -> bool {
    sns_endpoint_url(cert_url).is_some_and(|url| url.path().ends_with(".pem"))
}

/// Check that a subscribe or unsubscribe URL points at an SNS endpoint.
///
/// `UnsubscribeURL` is not covered by the signature, so this is the only
/// thing stopping a replayed confirmation from steering our GET elsewhere.
pub fn is_valid_confirmation_url(url: &str) -> bool {
    sns_endpoint_url(url).is_some()
}

/// Build the canonical string SNS signs for a message.
///
/// Returns `None` when a field required for the given type is absent.
pub fn string_to_sign(message_type: MessageType, message: &SnsMessage) -> Option<String> {
    let fields: Vec<(&str, Option<&String>)> = match message_type {
        MessageType::Notification => vec![
            ("Message", message.message.as_ref()),
            ("MessageId", message.message_id.as_ref()),
            ("Subject", message.subject.as_ref()),
            ("Timestamp", message.timestamp.as_ref()),
            ("TopicArn", message.topic_arn.as_ref()),
            ("Type", message.message_type.as_ref()),
        ],
        MessageType::SubscriptionConfirmation | MessageType::UnsubscribeConfirmation => vec![
            ("Message", message.message.as_ref()),
            ("MessageId", message.message_id.as_ref()),
            ("SubscribeURL", message.subscribe_url.as_ref()),
            ("Timestamp", message.timestamp.as_ref()),
            ("Token", message.token.as_ref()),
            ("TopicArn", message.topic_arn.as_ref()),
            ("Type", message.message_type.as_ref()),
        ],
        MessageType::Unknown => return None,
    };

    let mut canonical = String::new();
    for (name, value) in fields {
        match value {
            Some(value) => {
                canonical.push_str(name);
                canonical.push('\n');
                canonical.push_str(value);
                canonical.push('\n');
            }
            // Subject is the only optional signed field
            None if name == "Subject" => {}
            None => return None,
        }
    }

    Some(canonical)
}

/// Verify a base64 SNS signature against a PEM encoded signing certificate.
pub fn verify_signature(
    version: SignatureVersion,
    cert_pem: &[u8],
    canonical: &str,
    signature_b64: &str,
) -> bool {
    let signature = match STANDARD.decode(signature_b64.trim()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "sns_signature_not_base64");
            return false;
        }
    };

    let (_, pem) = match x509_parser::pem::parse_x509_pem(cert_pem) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "sns_certificate_not_pem");
            return false;
        }
    };

    let cert = match pem.parse_x509() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "sns_certificate_invalid");
            return false;
        }
    };

    if !cert.validity().is_valid() {
        warn!(subject = %cert.subject(), "sns_certificate_expired");
        return false;
    }

    let public_key: &[u8] = &cert.public_key().subject_public_key.data;
    let valid = UnparsedPublicKey::new(version.algorithm(), public_key)
        .verify(canonical.as_bytes(), &signature)
        .is_ok();

    if !valid {
        warn!(
            signature_length = signature.len(),
            canonical_length = canonical.len(),
            "sns_signature_mismatch"
        );
    }

    valid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> SnsMessage {
        SnsMessage {
            message_type: Some("Notification".to_string()),
            message_id: Some("22b80b92-fdea-4c2c-8f9d-bdfb0c7bf324".to_string()),
            topic_arn: Some("arn:aws:sns:us-west-2:123456789012:MyTopic".to_string()),
            message: Some("{\"notificationType\":\"Received\"}".to_string()),
            timestamp: Some("2012-05-02T00:54:06.655Z".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_cert_url_accepts_sns_hosts() {
        assert!(is_valid_cert_url(
            "https://sns.us-east-1.amazonaws.com/SimpleNotificationService-abc.pem"
        ));
        assert!(is_valid_cert_url(
            "https://sns.cn-north-1.amazonaws.com.cn/SimpleNotificationService-abc.pem"
        ));
    }

    #[test]
    fn test_cert_url_rejects_foreign_hosts() {
        assert!(!is_valid_cert_url("http://sns.us-east-1.amazonaws.com/cert.pem"));
        assert!(!is_valid_cert_url("https://sns.us-east-1.amazonaws.com.evil.com/cert.pem"));
        assert!(!is_valid_cert_url("https://evil.com/sns.us-east-1.amazonaws.com/cert.pem"));
        assert!(!is_valid_cert_url("https://sns..amazonaws.com/cert.pem"));
        assert!(!is_valid_cert_url("https://sns.us-east-1.amazonaws.com/cert.txt"));
        assert!(!is_valid_cert_url("https://sns.us-east-1.amazonaws.com:8443/cert.pem"));
        assert!(!is_valid_cert_url("not a url"));
    }

    #[test]
    fn test_confirmation_url() {
        assert!(is_valid_confirmation_url(
            "https://sns.us-west-2.amazonaws.com/?Action=Unsubscribe&SubscriptionArn=arn:aws:sns:us-west-2:123456789012:MyTopic:2bcfbf39"
        ));
        assert!(!is_valid_confirmation_url("https://attacker.example.com/?Action=Unsubscribe"));
        assert!(!is_valid_confirmation_url("http://sns.us-west-2.amazonaws.com/?Action=Unsubscribe"));
        assert!(!is_valid_confirmation_url("https://sns.us-west-2.amazonaws.com.evil.com/"));
    }

    #[test]
    fn test_signature_version_parse() {
        assert_eq!(SignatureVersion::parse(Some("1")), Some(SignatureVersion::V1));
        assert_eq!(SignatureVersion::parse(Some("2")), Some(SignatureVersion::V2));
        assert_eq!(SignatureVersion::parse(Some("3")), None);
        assert_eq!(SignatureVersion::parse(None), None);
    }

    #[test]
    fn test_string_to_sign_notification_without_subject() {
        let canonical = string_to_sign(MessageType::Notification, &notification()).unwrap();

        assert_eq!(
            canonical,
            "Message\n{\"notificationType\":\"Received\"}\n\
             MessageId\n22b80b92-fdea-4c2c-8f9d-bdfb0c7bf324\n\
             Timestamp\n2012-05-02T00:54:06.655Z\n\
             TopicArn\narn:aws:sns:us-west-2:123456789012:MyTopic\n\
             Type\nNotification\n"
        );
    }

    #[test]
    fn test_string_to_sign_includes_subject() {
        let mut message = notification();
        message.subject = Some("Amazon SES Email Receipt Notification".to_string());

        let canonical = string_to_sign(MessageType::Notification, &message).unwrap();
        assert!(canonical.contains("MessageId\n22b80b92-fdea-4c2c-8f9d-bdfb0c7bf324\nSubject\nAmazon SES"));
    }

    #[test]
    fn test_string_to_sign_confirmation_requires_token() {
        let message = SnsMessage {
            message_type: Some("SubscriptionConfirmation".to_string()),
            message_id: Some("id".to_string()),
            topic_arn: Some("arn".to_string()),
            message: Some("confirm".to_string()),
            timestamp: Some("ts".to_string()),
            subscribe_url: Some("https://sns.us-east-1.amazonaws.com/?Action=ConfirmSubscription".to_string()),
            ..Default::default()
        };
        assert!(string_to_sign(MessageType::SubscriptionConfirmation, &message).is_none());

        let message = SnsMessage {
            token: Some("token".to_string()),
            ..message
        };
        let canonical = string_to_sign(MessageType::SubscriptionConfirmation, &message).unwrap();
        assert!(canonical.starts_with("Message\nconfirm\nMessageId\nid\nSubscribeURL\n"));
        assert!(canonical.ends_with("Token\ntoken\nTopicArn\narn\nType\nSubscriptionConfirmation\n"));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(!verify_signature(SignatureVersion::V1, b"not a pem", "Message\nx\n", "AAAA"));
        assert!(!verify_signature(SignatureVersion::V1, b"", "Message\nx\n", "%%%not-base64%%%"));
    }
}
