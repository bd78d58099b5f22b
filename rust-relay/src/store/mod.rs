//! Object store holding raw messages deposited by the inbound mail service.
//!
//! The store is the durable queue: the relay lists what is pending, fetches
//! each object and deletes it once processed.

pub mod s3;

use async_trait::async_trait;
use thiserror::Error;

pub use self::s3::S3Store;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store listing failed: {0}")]
    List(String),

    #[error("failed to fetch {key}: {reason}")]
    Fetch { key: String, reason: String },

    #[error("failed to delete {key}: {reason}")]
    Delete { key: String, reason: String },

    #[error("store configuration error: {0}")]
    Config(String),
}

/// Raw message fetched from the store.
#[derive(Debug, Clone)]
pub struct StoredMail {
    pub key: String,
    pub raw: Vec<u8>,
}

/// Capability interface over the object store.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// List every pending key, in store order.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Fetch the raw bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<StoredMail, StoreError>;

    /// Remove `key` from the store.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
