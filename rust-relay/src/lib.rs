//! SES Relay - drains inbound mail from S3 into an SMTP transfer agent.
//!
//! ## Architecture
//!
//! ```text
//! SES → S3 bucket ──┐
//! SES → SNS → POST / → Relay::drain() → SMTP transfer agent
//!                                └──→ bounce to postmaster
//! ```
//!
//! Each SNS notification triggers a serialized drain pass over every
//! object pending in the bucket.

pub mod config;
pub mod delivery;
pub mod drain;
pub mod notification;
pub mod process;
pub mod store;
pub mod web;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use delivery::{Deliverer, DeliveryOutcome, DeliveryStatus, SmtpConfig, SmtpDeliverer};
pub use drain::{DrainGate, DrainReport, Relay};
pub use notification::{NotificationValidator, SnsValidator};
pub use store::{MailStore, S3Store, StoreError};
pub use web::{router, AppState};
