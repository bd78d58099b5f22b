//! Web server module for the SNS webhook.
//!
//! - `POST /` receives SNS notifications
//! - `GET /health` answers liveness checks

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{health, sns_webhook, AppState, HealthResponse, WebhookError};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", post(sns_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
