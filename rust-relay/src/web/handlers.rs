//! Webhook endpoint handlers.
//!
//! The SNS endpoint gates every request in order:
//! 1. Message type header
//! 2. JSON body
//! 3. Certificate and confirmation URL origin, then signature
//!
//! Only then is the notification dispatched. Confirmations are answered by
//! fetching the URL SNS handed us; notifications run a drain pass and
//! respond once it has completed.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::drain::Relay;
use crate::notification::{
    MessageType, NotificationValidator, SnsMessage, ValidationError, MESSAGE_TYPE_HEADER,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<dyn NotificationValidator>,
    pub relay: Arc<Relay>,
    pub http: Client,
}

impl AppState {
    pub fn new(validator: Arc<dyn NotificationValidator>, relay: Arc<Relay>, http: Client) -> Self {
        Self {
            validator,
            relay,
            http,
        }
    }
}

/// Webhook failures, rendered as a plain text reason.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request body is not in json format.")]
    InvalidJson,

    #[error("Request to {0} failed.")]
    ConfirmationFailed(&'static str),

    #[error("Mail relay pass failed.")]
    DrainFailed,
}

impl WebhookError {
    fn status(&self) -> StatusCode {
        match self {
            WebhookError::Validation(_) | WebhookError::InvalidJson => StatusCode::BAD_REQUEST,
            WebhookError::ConfirmationFailed(_) | WebhookError::DrainFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// SNS Webhook
// =============================================================================

/// SNS webhook endpoint.
pub async fn sns_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let header = headers
        .get(MESSAGE_TYPE_HEADER)
        .and_then(|v| v.to_str().ok());

    let message_type = state.validator.validate_message_type(header).map_err(|e| {
        warn!(message_type = ?header, "sns_invalid_message_type");
        e
    })?;

    let message: SnsMessage = serde_json::from_slice(&body).map_err(|e| {
        warn!(
            message_type = message_type.as_str(),
            error = %e,
            body_length = body.len(),
            "sns_body_not_json"
        );
        WebhookError::InvalidJson
    })?;

    info!(
        message_type = message_type.as_str(),
        message_id = ?message.message_id,
        topic_arn = ?message.topic_arn,
        "sns_webhook_received"
    );

    state
        .validator
        .validate_message(message_type, &message)
        .await
        .map_err(|e| {
            warn!(
                message_type = message_type.as_str(),
                message_id = ?message.message_id,
                reason = %e,
                "sns_validation_failed"
            );
            e
        })?;

    match message_type {
        MessageType::SubscriptionConfirmation => {
            confirm(&state.http, message.subscribe_url.as_deref(), "SubscribeURL").await?;
            info!(topic_arn = ?message.topic_arn, "sns_subscription_confirmed");
            Ok((StatusCode::OK, "Subscription is successfully confirmed.").into_response())
        }
        MessageType::UnsubscribeConfirmation => {
            confirm(&state.http, message.unsubscribe_url.as_deref(), "UnsubscribeURL").await?;
            info!(topic_arn = ?message.topic_arn, "sns_unsubscribed");
            Ok((StatusCode::OK, "Successfully unsubscribed.").into_response())
        }
        MessageType::Notification => {
            run_drain(&state.relay).await?;
            Ok(StatusCode::OK.into_response())
        }
        MessageType::Unknown => {
            warn!(message_id = ?message.message_id, "sns_unknown_message_type");
            Ok(StatusCode::OK.into_response())
        }
    }
}

/// GET a confirmation URL supplied by SNS.
async fn confirm(
    client: &Client,
    url: Option<&str>,
    field: &'static str,
) -> Result<(), WebhookError> {
    let Some(url) = url else {
        warn!(field = field, "sns_confirmation_url_missing");
        return Err(WebhookError::ConfirmationFailed(field));
    };

    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => {
            error!(field = field, status = %response.status(), "sns_confirmation_failed");
            Err(WebhookError::ConfirmationFailed(field))
        }
        Err(e) => {
            error!(field = field, error = %e, "sns_confirmation_failed");
            Err(WebhookError::ConfirmationFailed(field))
        }
    }
}

/// Run a drain pass on its own task and wait for it.
///
/// The pass completes even if the caller goes away.
async fn run_drain(relay: &Arc<Relay>) -> Result<(), WebhookError> {
    let relay = Arc::clone(relay);
    let handle = tokio::spawn(async move { relay.drain().await });

    match handle.await {
        Ok(Ok(report)) => {
            info!(
                objects = report.objects,
                attempts = report.attempts,
                failed = report.failed,
                "sns_notification_drained"
            );
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "sns_notification_drain_failed");
            Err(WebhookError::DrainFailed)
        }
        Err(e) => {
            error!(error = %e, "sns_notification_drain_panicked");
            Err(WebhookError::DrainFailed)
        }
    }
}
