//! RFC 5322 Email Parser using mailparse.
//!
//! Decodes a raw stored message into the envelope the relay needs:
//! the sender, the deduplicated To/Cc/Bcc recipients, the subject and
//! a plain text rendition of the body.

use std::collections::HashSet;

use mailparse::{addrparse_header, parse_mail, MailAddr, MailHeaderMap, ParsedMail};
use thiserror::Error;
use tracing::{info, warn};

/// Raised when a stored object cannot be decoded as a message.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse message: {0}")]
    Message(#[from] mailparse::MailParseError),

    #[error("malformed {header} header: {reason}")]
    AddressHeader { header: &'static str, reason: String },
}

/// Headers whose addresses become envelope recipients, in delivery order.
const RECIPIENT_HEADERS: [&str; 3] = ["To", "Cc", "Bcc"];

/// Parsed email result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    /// Envelope sender taken from From (or Return-Path); `None` means `<>`
    pub envelope_from: Option<String>,
    /// Unique lowercase recipient addresses in order of first appearance
    pub recipients: Vec<String>,
    /// Decoded Subject header value
    pub subject: Option<String>,
    /// Original headers as (name, decoded value) pairs
    pub headers: Vec<(String, String)>,
    /// First text/plain body, or the top-level body for single-part mail
    pub body: String,
}

/// Parse raw RFC 5322 email content.
pub fn parse_raw_email(raw: &[u8]) -> Result<ParsedMessage, ParseError> {
    let mail = parse_mail(raw)?;

    let mut recipients = Vec::new();
    let mut seen = HashSet::new();
    let mut malformed = None;

    for name in RECIPIENT_HEADERS {
        for header in mail.headers.get_all_headers(name) {
            let list = match addrparse_header(header) {
                Ok(l) => l,
                Err(e) => {
                    warn!(
                        header = name,
                        value = %header.get_value(),
                        error = %e,
                        "email_recipient_header_skipped"
                    );
                    malformed.get_or_insert(ParseError::AddressHeader {
                        header: name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for addr in list.iter() {
                match addr {
                    MailAddr::Single(info) => push_unique(&mut recipients, &mut seen, &info.addr),
                    MailAddr::Group(group) => {
                        for info in &group.addrs {
                            push_unique(&mut recipients, &mut seen, &info.addr);
                        }
                    }
                }
            }
        }
    }

    // Only fatal when no recipient survived
    if recipients.is_empty() {
        if let Some(err) = malformed {
            return Err(err);
        }
    }

    let envelope_from = first_address(&mail, "From").or_else(|| first_address(&mail, "Return-Path"));

    let subject = mail.headers.get_first_value("Subject");

    let headers = mail
        .headers
        .iter()
        .map(|h| (h.get_key(), h.get_value()))
        .collect();

    let body = extract_text_body(&mail).unwrap_or_default();

    info!(
        envelope_from = ?envelope_from,
        recipients = recipients.len(),
        subject = ?subject,
        body_length = body.len(),
        "email_parse_complete"
    );

    Ok(ParsedMessage {
        envelope_from,
        recipients,
        subject,
        headers,
        body,
    })
}

fn push_unique(recipients: &mut Vec<String>, seen: &mut HashSet<String>, addr: &str) {
    let normalized = addr.trim().to_lowercase();
    if normalized.is_empty() {
        return;
    }
    if seen.insert(normalized.clone()) {
        recipients.push(normalized);
    }
}

/// First mailbox address found in the named header.
fn first_address(mail: &ParsedMail, name: &str) -> Option<String> {
    let header = mail.headers.get_first_header(name)?;
    let list = match addrparse_header(header) {
        Ok(l) => l,
        Err(e) => {
            warn!(header = name, error = %e, "email_sender_unparseable");
            return None;
        }
    };

    list.iter()
        .find_map(|addr| match addr {
            MailAddr::Single(info) => Some(info.addr.clone()),
            MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
        })
        .filter(|addr| !addr.trim().is_empty())
}

/// Extract the text body from a parsed email.
///
/// Handles various email structures:
/// - text/plain (direct content)
/// - multipart/* (first text/plain part, searched recursively)
fn extract_text_body(mail: &ParsedMail) -> Option<String> {
    let content_type = mail.ctype.mimetype.as_str();

    if content_type.starts_with("multipart/") {
        return find_text_in_parts(&mail.subparts);
    }

    extract_body_text(mail)
}

fn find_text_in_parts(parts: &[ParsedMail]) -> Option<String> {
    parts.iter().find_map(|part| {
        let part_type = part.ctype.mimetype.as_str();
        if part_type == "text/plain" {
            extract_body_text(part)
        } else if part_type.starts_with("multipart/") {
            find_text_in_parts(&part.subparts)
        } else {
            None
        }
    })
}

/// Extract the body text from a mail part.
fn extract_body_text(mail: &ParsedMail) -> Option<String> {
    match mail.get_body() {
        Ok(body) => {
            if body.trim().is_empty() {
                None
            } else {
                Some(body)
            }
        }
        Err(e) => {
            warn!(error = %e, "email_body_extraction_failed");
            None
        }
    }
}
