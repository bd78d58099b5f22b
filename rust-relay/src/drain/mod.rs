//! Drain engine - core relay logic.
//!
//! A drain pass lists the pending objects in the store and, for each one:
//! 1. Fetches and parses the raw message
//! 2. Delivers it to every unique recipient in its own session
//! 3. Sends a bounce to the operator mailbox for every failed recipient
//! 4. Deletes the object, whatever the delivery results were
//!
//! A pass works on one listing snapshot. Objects deposited after the
//! listing, and objects that could not be fetched, wait for the next
//! trigger.

pub mod gate;

use std::sync::Arc;

use lettre::message::Mailbox;
use tracing::{error, info, warn};

use crate::delivery::{Deliverer, DeliveryOutcome, DeliveryStatus};
use crate::process::{parse_raw_email, send_bounce, BounceReport, ParsedMessage};
use crate::store::{MailStore, StoreError, StoredMail};

pub use gate::{DrainGate, DrainPermit};

/// Recipient recorded for objects whose recipients could not be parsed.
const UNPARSED_RECIPIENT: &str = "unknown";

/// Counters for one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Objects fetched and processed
    pub objects: usize,
    /// Delivery attempts made
    pub attempts: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Bounces accepted by the transfer agent
    pub bounced: usize,
    pub bounce_failures: usize,
    /// Listed objects that could not be fetched and were left in the store
    pub skipped: usize,
    /// Processed objects whose delete failed
    pub delete_failures: usize,
}

/// The relay: store, transfer agent and operator mailbox behind one gate.
pub struct Relay {
    store: Arc<dyn MailStore>,
    deliverer: Arc<dyn Deliverer>,
    postmaster: Mailbox,
    gate: DrainGate,
}

impl Relay {
    pub fn new(
        store: Arc<dyn MailStore>,
        deliverer: Arc<dyn Deliverer>,
        postmaster: Mailbox,
        gate: DrainGate,
    ) -> Self {
        Self {
            store,
            deliverer,
            postmaster,
            gate,
        }
    }

    pub fn gate(&self) -> &DrainGate {
        &self.gate
    }

    /// Run one serialized drain pass.
    ///
    /// Fails only when the store cannot be listed; per-object failures are
    /// logged and counted in the report.
    pub async fn drain(&self) -> Result<DrainReport, StoreError> {
        let _permit = self.gate.acquire().await;

        info!("drain_start");

        let keys = self.store.list().await?;
        info!(pending = keys.len(), "drain_listed");

        let mut report = DrainReport::default();
        for key in &keys {
            self.process_key(key, &mut report).await;
        }

        info!(
            objects = report.objects,
            attempts = report.attempts,
            delivered = report.delivered,
            failed = report.failed,
            bounced = report.bounced,
            bounce_failures = report.bounce_failures,
            skipped = report.skipped,
            delete_failures = report.delete_failures,
            "drain_complete"
        );

        Ok(report)
    }

    async fn process_key(&self, key: &str, report: &mut DrainReport) {
        let mail = match self.store.get(key).await {
            Ok(m) => m,
            Err(e) => {
                error!(key = %key, error = %e, "drain_fetch_failed");
                report.skipped += 1;
                return;
            }
        };

        report.objects += 1;
        self.relay_mail(&mail, report).await;

        // Consumed regardless of delivery outcome
        match self.store.delete(key).await {
            Ok(()) => info!(key = %key, "drain_object_deleted"),
            Err(e) => {
                error!(key = %key, error = %e, "drain_delete_failed");
                report.delete_failures += 1;
            }
        }
    }

    async fn relay_mail(&self, mail: &StoredMail, report: &mut DrainReport) {
        let parsed = match parse_raw_email(&mail.raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(key = %mail.key, error = %e, "drain_parse_failed");
                let outcome = DeliveryOutcome::new(
                    UNPARSED_RECIPIENT,
                    DeliveryStatus::OtherFailure,
                    format!("message could not be parsed: {e}"),
                );
                report.failed += 1;
                self.bounce(None, &mail.raw, &outcome, report).await;
                return;
            }
        };

        info!(
            key = %mail.key,
            envelope_from = ?parsed.envelope_from,
            recipients = parsed.recipients.len(),
            size = mail.raw.len(),
            "drain_object_parsed"
        );

        if parsed.recipients.is_empty() {
            warn!(key = %mail.key, "drain_no_recipients");
        }

        for recipient in &parsed.recipients {
            report.attempts += 1;
            let outcome = self
                .deliverer
                .deliver(parsed.envelope_from.as_deref(), recipient, &mail.raw)
                .await;

            if outcome.status.needs_bounce() {
                report.failed += 1;
                warn!(
                    key = %mail.key,
                    recipient = %recipient,
                    status = %outcome.status,
                    detail = %outcome.detail,
                    "drain_delivery_failed"
                );
                self.bounce(Some(&parsed), &mail.raw, &outcome, report).await;
            } else {
                report.delivered += 1;
                info!(key = %mail.key, recipient = %recipient, "drain_delivered");
            }
        }
    }

    async fn bounce(
        &self,
        parsed: Option<&ParsedMessage>,
        raw: &[u8],
        outcome: &DeliveryOutcome,
        report: &mut DrainReport,
    ) {
        let bounce = BounceReport::new(parsed, raw, &outcome.recipient, &outcome.detail);
        if send_bounce(self.deliverer.as_ref(), &self.postmaster, &bounce).await {
            report.bounced += 1;
        } else {
            report.bounce_failures += 1;
        }
    }
}
