//! SES Relay server.
//!
//! Startup runs one drain pass to pick up anything deposited while the
//! relay was down, then serves the SNS webhook until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sesrelay::{
    router, AppState, Config, DrainGate, Relay, S3Store, SmtpConfig, SmtpDeliverer, SnsValidator,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_starting");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        bucket = %config.s3_bucket,
        region = %config.s3_region,
        key_prefix = %config.s3_key_prefix,
        smtp_host = %config.smtp_host,
        smtp_port = config.smtp_port,
        smtp_tls = config.smtp_tls,
        smtp_auth = config.smtp_user.is_some(),
        "config_loaded"
    );

    let postmaster: Mailbox = config
        .postmaster_mailbox
        .parse()
        .with_context(|| format!("Invalid POSTMASTER_MAILBOX {:?}", config.postmaster_mailbox))?;

    // Build clients
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()
        .context("Failed to build HTTP client")?;

    let store = S3Store::open(&config).context("Failed to open object store")?;
    let deliverer = SmtpDeliverer::new(SmtpConfig::from_config(&config));

    let relay = Arc::new(Relay::new(
        Arc::new(store),
        Arc::new(deliverer),
        postmaster,
        DrainGate::new(),
    ));

    // Pick up anything deposited while we were down
    match relay.drain().await {
        Ok(report) => info!(objects = report.objects, "startup_drain_complete"),
        Err(e) => warn!(error = %e, "startup_drain_failed"),
    }

    let state = AppState::new(Arc::new(SnsValidator::new(http.clone())), relay, http);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("relay_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "sigint_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_shutting_down");
}
