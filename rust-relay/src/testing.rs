//! In-memory fakes for the relay's capability traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::delivery::{Deliverer, DeliveryOutcome, DeliveryStatus};
use crate::notification::{MessageType, NotificationValidator, SnsMessage, ValidationError};
use crate::store::{MailStore, StoreError, StoredMail};

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCalls {
    pub list: usize,
    pub get: usize,
    pub delete: usize,
    pub listed_objects: usize,
}

/// Store backed by an ordered list of objects.
///
/// Every operation marks itself active for its duration; `max_active`
/// records the highest overlap observed across concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    calls: Mutex<StoreCalls>,
    fail_get: Mutex<Vec<String>>,
    fail_delete: Mutex<Vec<String>>,
    fail_list: Mutex<bool>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    op_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: &str, raw: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .push((key.to_string(), raw.to_vec()));
        self
    }

    pub fn with_failing_get(self, key: &str) -> Self {
        self.fail_get.lock().unwrap().push(key.to_string());
        self
    }

    pub fn with_failing_delete(self, key: &str) -> Self {
        self.fail_delete.lock().unwrap().push(key.to_string());
        self
    }

    pub fn with_failing_list(self) -> Self {
        *self.fail_list.lock().unwrap() = true;
        self
    }

    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = Some(delay);
        self
    }

    pub fn insert(&self, key: &str, raw: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .push((key.to_string(), raw.to_vec()));
    }

    pub fn calls(&self) -> StoreCalls {
        *self.calls.lock().unwrap()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        match self.op_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        self.enter().await;
        let result = if *self.fail_list.lock().unwrap() {
            Err(StoreError::List("listing unavailable".to_string()))
        } else {
            let keys = self.keys();
            let mut calls = self.calls.lock().unwrap();
            calls.list += 1;
            calls.listed_objects += keys.len();
            Ok(keys)
        };
        self.leave();
        result
    }

    async fn get(&self, key: &str) -> Result<StoredMail, StoreError> {
        self.enter().await;
        self.calls.lock().unwrap().get += 1;
        let result = if self.fail_get.lock().unwrap().iter().any(|k| k == key) {
            Err(StoreError::Fetch {
                key: key.to_string(),
                reason: "unavailable".to_string(),
            })
        } else {
            self.objects
                .lock()
                .unwrap()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(k, raw)| StoredMail {
                    key: k.clone(),
                    raw: raw.clone(),
                })
                .ok_or_else(|| StoreError::Fetch {
                    key: key.to_string(),
                    reason: "no such key".to_string(),
                })
        };
        self.leave();
        result
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.enter().await;
        self.calls.lock().unwrap().delete += 1;
        let result = if self.fail_delete.lock().unwrap().iter().any(|k| k == key) {
            Err(StoreError::Delete {
                key: key.to_string(),
                reason: "access denied".to_string(),
            })
        } else {
            self.objects.lock().unwrap().retain(|(k, _)| k != key);
            Ok(())
        };
        self.leave();
        result
    }
}

// =============================================================================
// Deliverer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCall {
    pub from: Option<String>,
    pub recipient: String,
    pub raw: Vec<u8>,
}

/// Deliverer recording every attempt; recipients are delivered unless a
/// status was scripted for them.
#[derive(Default)]
pub struct RecordingDeliverer {
    calls: Mutex<Vec<DeliveryCall>>,
    scripted: HashMap<String, DeliveryStatus>,
}

impl RecordingDeliverer {
    pub fn with_status(mut self, recipient: &str, status: DeliveryStatus) -> Self {
        self.scripted.insert(recipient.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, recipient: &str) -> Vec<DeliveryCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.recipient == recipient)
            .collect()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(&self, from: Option<&str>, recipient: &str, raw: &[u8]) -> DeliveryOutcome {
        self.calls.lock().unwrap().push(DeliveryCall {
            from: from.map(str::to_string),
            recipient: recipient.to_string(),
            raw: raw.to_vec(),
        });

        let status = self
            .scripted
            .get(recipient)
            .copied()
            .unwrap_or(DeliveryStatus::Delivered);

        DeliveryOutcome::new(recipient, status, format!("scripted {status}"))
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validator accepting every signature, or refusing all with a fixed error.
#[derive(Default)]
pub struct StaticValidator {
    pub refuse_with: Option<ValidationError>,
}

impl StaticValidator {
    pub fn refusing(error: ValidationError) -> Self {
        Self {
            refuse_with: Some(error),
        }
    }
}

#[async_trait]
impl NotificationValidator for StaticValidator {
    async fn validate_message(
        &self,
        _message_type: MessageType,
        _message: &SnsMessage,
    ) -> Result<(), ValidationError> {
        match self.refuse_with {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
