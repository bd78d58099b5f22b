//! Configuration module for environment variable parsing.
//!
//! Required values (bucket, transfer agent host, postmaster mailbox) must be
//! present at startup; anything malformed is reported instead of defaulted.

use std::env;
use std::str::FromStr;

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Object Store
    // =========================================================================
    /// Bucket where the inbound mail service deposits raw messages
    pub s3_bucket: String,

    /// Bucket region
    pub s3_region: String,

    /// Optional custom endpoint (S3-compatible stores)
    pub s3_endpoint: Option<String>,

    /// Only keys under this prefix are drained
    pub s3_key_prefix: String,

    /// Static access key; falls back to the AWS credential chain when unset
    pub s3_access_key: Option<String>,

    /// Static secret key
    pub s3_secret_key: Option<String>,

    // =========================================================================
    // Transfer Agent
    // =========================================================================
    /// Downstream SMTP host
    pub smtp_host: String,

    /// Downstream SMTP port
    pub smtp_port: u16,

    /// Optional AUTH user; authentication is skipped when empty
    pub smtp_user: Option<String>,

    /// AUTH password
    pub smtp_password: Option<String>,

    /// Use implicit TLS when connecting
    pub smtp_tls: bool,

    /// Per-session network timeout in milliseconds
    pub smtp_timeout_ms: u64,

    /// Name announced in EHLO
    pub smtp_helo_name: String,

    /// Operator mailbox receiving bounce reports
    pub postmaster_mailbox: String,

    // =========================================================================
    // Web Server
    // =========================================================================
    /// Port for the web server to listen on
    pub port: u16,

    /// HTTP client timeout in milliseconds (confirmation URLs, signing certs)
    pub request_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let smtp_user = var("SMTP_USER");
        let smtp_password = if smtp_user.is_some() {
            lookup("SMTP_PASSWORD")
        } else {
            None
        };

        Ok(Config {
            s3_bucket: required(&var, "S3_BUCKET_NAME")?,

            s3_region: var("S3_REGION")
                .or_else(|| var("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".to_string()),

            s3_endpoint: var("S3_ENDPOINT"),

            s3_key_prefix: var("S3_KEY_PREFIX").unwrap_or_default(),

            s3_access_key: var("AWS_ACCESS_KEY_ID"),

            s3_secret_key: var("AWS_SECRET_ACCESS_KEY"),

            smtp_host: required(&var, "SMTP_HOST")?,

            smtp_port: parse_or(&var, "SMTP_PORT", 25)?,

            smtp_user,

            smtp_password,

            smtp_tls: parse_bool(&var, "SMTP_TLS", false)?,

            smtp_timeout_ms: parse_or(&var, "SMTP_TIMEOUT_MS", 30_000)?,

            smtp_helo_name: var("SMTP_HELO_NAME").unwrap_or_else(|| "localhost".to_string()),

            postmaster_mailbox: required(&var, "POSTMASTER_MAILBOX")?,

            port: parse_or(&var, "PORT", 8080)?,

            request_timeout_ms: parse_or(&var, "REQUEST_TIMEOUT_MS", 8000)?,
        })
    }
}

fn required<F>(var: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    var(name).ok_or(ConfigError::Missing(name))
}

/// Parse an optional variable, falling back to `default` only when unset.
fn parse_or<F, T>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn parse_bool<F>(var: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: v }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("S3_BUCKET_NAME", "inbound-mail"),
        ("SMTP_HOST", "mx.internal"),
        ("POSTMASTER_MAILBOX", "postmaster@example.com"),
    ];

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_lookup(lookup(MINIMAL)).unwrap();

        assert_eq!(config.s3_bucket, "inbound-mail");
        assert_eq!(config.s3_region, "us-east-1");
        assert_eq!(config.smtp_port, 25);
        assert!(!config.smtp_tls);
        assert_eq!(config.smtp_helo_name, "localhost");
        assert_eq!(config.smtp_user, None);
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout_ms, 8000);
    }

    #[test]
    fn test_missing_required_fails_fast() {
        let err = Config::from_lookup(lookup(&[("S3_BUCKET_NAME", "b")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("SMTP_HOST"));

        let err = Config::from_lookup(lookup(&[
            ("S3_BUCKET_NAME", "b"),
            ("SMTP_HOST", "h"),
            ("POSTMASTER_MAILBOX", "  "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("POSTMASTER_MAILBOX"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("SMTP_PORT", "smtp"));

        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SMTP_PORT", .. }));
    }

    #[test]
    fn test_credentials_only_with_user() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("SMTP_PASSWORD", "secret"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.smtp_password, None);

        pairs.push(("SMTP_USER", "relay"));
        pairs.push(("SMTP_TLS", "true"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.smtp_user.as_deref(), Some("relay"));
        assert_eq!(config.smtp_password.as_deref(), Some("secret"));
        assert!(config.smtp_tls);
    }

    #[test]
    fn test_region_fallback() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("AWS_REGION", "eu-west-1"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.s3_region, "eu-west-1");
    }
}
