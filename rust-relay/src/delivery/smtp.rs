//! SMTP delivery using lettre's async connection.
//!
//! Each call runs its own session: connect, EHLO, optional AUTH,
//! MAIL/RCPT/DATA, QUIT. Any failure on an open session is followed by an
//! explicit RSET before the connection is closed, so no protocol state
//! leaks into the next attempt.

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Mail, Rcpt, Rset};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::Error as SmtpError;
use lettre::Address;
use tracing::{debug, info, warn};

use super::{Deliverer, DeliveryOutcome, DeliveryStatus};
use crate::Config;

/// Connection settings for the transfer agent.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
    pub tls: bool,
    pub timeout: Duration,
    pub helo_name: String,
}

impl SmtpConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            credentials: config.smtp_user.clone().map(|user| {
                (user, config.smtp_password.clone().unwrap_or_default())
            }),
            tls: config.smtp_tls,
            timeout: Duration::from_millis(config.smtp_timeout_ms),
            helo_name: config.smtp_helo_name.clone(),
        }
    }
}

/// Protocol step that failed, used to attribute the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Auth,
    Mail,
    Rcpt,
    Data,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Auth => "auth",
            Stage::Mail => "mail",
            Stage::Rcpt => "rcpt",
            Stage::Data => "data",
        }
    }

    /// A reply to RCPT is the agent refusing that recipient; everything
    /// else is a transport problem.
    fn classify(&self, err: &SmtpError) -> DeliveryStatus {
        match self {
            Stage::Rcpt if err.is_permanent() || err.is_transient() => DeliveryStatus::Rejected,
            _ => DeliveryStatus::TransportFailure,
        }
    }
}

/// Deliverer opening one SMTP session per recipient.
#[derive(Debug, Clone)]
pub struct SmtpDeliverer {
    config: SmtpConfig,
}

impl SmtpDeliverer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<AsyncSmtpConnection, DeliveryStatus> {
        let tls = if self.config.tls {
            match TlsParameters::new(self.config.host.clone()) {
                Ok(params) => Some(params),
                Err(e) => {
                    warn!(host = %self.config.host, error = %e, "smtp_tls_parameters_invalid");
                    return Err(DeliveryStatus::OtherFailure);
                }
            }
        } else {
            None
        };

        AsyncSmtpConnection::connect_tokio1(
            (self.config.host.as_str(), self.config.port),
            Some(self.config.timeout),
            &ClientId::Domain(self.config.helo_name.clone()),
            tls,
            None,
        )
        .await
        .map_err(|e| {
            warn!(
                host = %self.config.host,
                port = self.config.port,
                error = %e,
                "smtp_connect_failed"
            );
            DeliveryStatus::TransportFailure
        })
    }

    /// Run one mail transaction on an open session.
    async fn transaction(
        &self,
        conn: &mut AsyncSmtpConnection,
        sender: Option<Address>,
        recipient: Address,
        raw: &[u8],
    ) -> Result<String, (Stage, SmtpError)> {
        if let Some((user, password)) = &self.config.credentials {
            let credentials = Credentials::new(user.clone(), password.clone());
            conn.auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
                .await
                .map_err(|e| (Stage::Auth, e))?;
        }

        conn.command(Mail::new(sender, vec![]))
            .await
            .map_err(|e| (Stage::Mail, e))?;

        conn.command(Rcpt::new(recipient, vec![]))
            .await
            .map_err(|e| (Stage::Rcpt, e))?;

        conn.command(Data).await.map_err(|e| (Stage::Data, e))?;

        let response = conn.message(raw).await.map_err(|e| (Stage::Data, e))?;

        Ok(response.code().to_string())
    }

    /// Bring a failed session back to a clean state, then close it.
    async fn reset_and_close(conn: &mut AsyncSmtpConnection) {
        if !conn.has_broken() {
            if let Err(e) = conn.command(Rset).await {
                debug!(error = %e, "smtp_reset_failed");
            }
        }
        conn.abort().await;
    }
}

#[async_trait]
impl Deliverer for SmtpDeliverer {
    async fn deliver(&self, from: Option<&str>, recipient: &str, raw: &[u8]) -> DeliveryOutcome {
        let sender = match from.map(str::parse::<Address>).transpose() {
            Ok(s) => s,
            Err(e) => {
                return DeliveryOutcome::new(
                    recipient,
                    DeliveryStatus::OtherFailure,
                    format!("invalid envelope sender {from:?}: {e}"),
                )
            }
        };

        let rcpt = match recipient.parse::<Address>() {
            Ok(r) => r,
            Err(e) => {
                return DeliveryOutcome::new(
                    recipient,
                    DeliveryStatus::OtherFailure,
                    format!("invalid recipient address: {e}"),
                )
            }
        };

        let mut conn = match self.connect().await {
            Ok(c) => c,
            Err(status) => {
                return DeliveryOutcome::new(
                    recipient,
                    status,
                    format!(
                        "could not open session to {}:{}",
                        self.config.host, self.config.port
                    ),
                )
            }
        };

        match self.transaction(&mut conn, sender, rcpt, raw).await {
            Ok(code) => {
                if let Err(e) = conn.quit().await {
                    debug!(error = %e, "smtp_quit_failed");
                }
                info!(recipient = %recipient, code = %code, "smtp_delivered");
                DeliveryOutcome::delivered(recipient, format!("accepted with {code}"))
            }
            Err((stage, e)) => {
                let status = stage.classify(&e);
                warn!(
                    recipient = %recipient,
                    stage = stage.as_str(),
                    status = %status,
                    error = %e,
                    "smtp_delivery_failed"
                );
                Self::reset_and_close(&mut conn).await;
                DeliveryOutcome::new(recipient, status, format!("{} failed: {e}", stage.as_str()))
            }
        }
    }
}
