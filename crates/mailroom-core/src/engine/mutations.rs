//! Local-first label mutations.
//!
//! The label store and the change feed are updated before any network I/O.
//! Delivery happens in the background and is reported through
//! [`PendingDelivery`].

use std::sync::Arc;

use nostr_sdk::prelude::*;
use tracing::debug;

use crate::constants::kinds;
use crate::engine::feed::ChangeEmitter;
use crate::engine::outbound::{deletion_request, label_assertion};
use crate::engine::pending::{DeliveryOutcome, Dispatcher, OperationKind, PendingDelivery, PendingOperations};
use crate::error::{CoreError, Result};
use crate::events::ChangeEvent;
use crate::models::{validate_label, LabelUpsert};
use crate::nostr::EnvelopeCrypto;
use crate::store::{Database, LabelStore, MailboxStore};

#[derive(Debug)]
pub enum LabelMutation {
    /// The label was already in the requested state
    Unchanged,
    /// Committed locally; `label_event_id` is the label event asserted or
    /// retracted
    Applied {
        label_event_id: String,
        delivery: PendingDelivery,
    },
}

impl LabelMutation {
    pub fn is_applied(&self) -> bool {
        matches!(self, LabelMutation::Applied { .. })
    }

    pub fn into_delivery(self) -> Option<PendingDelivery> {
        match self {
            LabelMutation::Applied { delivery, .. } => Some(delivery),
            LabelMutation::Unchanged => None,
        }
    }
}

#[derive(Clone)]
pub struct LabelCoordinator {
    crypto: Arc<dyn EnvelopeCrypto>,
    labels: LabelStore,
    mailbox: MailboxStore,
    emitter: ChangeEmitter,
    dispatcher: Dispatcher,
    namespace: String,
}

impl LabelCoordinator {
    pub fn new(
        db: Database,
        crypto: Arc<dyn EnvelopeCrypto>,
        emitter: ChangeEmitter,
        dispatcher: Dispatcher,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            crypto,
            labels: LabelStore::new(db.clone()),
            mailbox: MailboxStore::new(db),
            emitter,
            dispatcher,
            namespace: namespace.into(),
        }
    }

    pub async fn add_label(
        &self,
        me: &PublicKey,
        message_id: &str,
        label: &str,
    ) -> Result<LabelMutation> {
        validate_label(label)?;
        if !self.mailbox.contains(message_id)? {
            return Err(CoreError::not_found(message_id));
        }
        // Unlocked check; a concurrent add for the same pair is benign
        if self.labels.contains(message_id, label)? {
            return Ok(LabelMutation::Unchanged);
        }

        let unsigned = label_assertion(me, &self.namespace, message_id, label);
        let event = self.crypto.sign(unsigned.clone()).await?;
        let label_event_id = event.id.to_hex();

        if self.labels.upsert(message_id, label, &label_event_id)? == LabelUpsert::Inserted {
            self.emitter.emit(ChangeEvent::label_added(message_id, label));
        }
        debug!(message_id, label, event_id = %label_event_id, "Label added locally");

        let delivery = self.dispatcher.dispatch(
            OperationKind::LabelAssertion,
            message_id,
            label,
            unsigned,
            Some(event),
        );
        Ok(LabelMutation::Applied {
            label_event_id,
            delivery,
        })
    }

    pub async fn remove_label(
        &self,
        me: &PublicKey,
        message_id: &str,
        label: &str,
    ) -> Result<LabelMutation> {
        validate_label(label)?;
        let Some(record) = self.labels.remove(message_id, label)? else {
            if !self.mailbox.contains(message_id)? {
                return Err(CoreError::not_found(message_id));
            }
            return Ok(LabelMutation::Unchanged);
        };

        self.emitter.emit(ChangeEvent::label_removed(message_id, label));
        debug!(message_id, label, "Label removed locally");

        // Signed in the background by the dispatcher
        let unsigned = deletion_request(me, &record.label_event_id, kinds::LABEL);
        let delivery = self.dispatcher.dispatch(
            OperationKind::LabelRetraction,
            message_id,
            label,
            unsigned,
            None,
        );
        Ok(LabelMutation::Applied {
            label_event_id: record.label_event_id,
            delivery,
        })
    }

    pub fn has_label(&self, message_id: &str, label: &str) -> Result<bool> {
        self.labels.contains(message_id, label)
    }

    pub fn labels(&self, message_id: &str) -> Result<Vec<String>> {
        self.labels.labels_for(message_id)
    }

    pub fn pending(&self) -> &PendingOperations {
        self.dispatcher.pending()
    }

    pub async fn retry_pending(&self) -> Vec<(String, DeliveryOutcome)> {
        self.dispatcher.retry_failed().await
    }
}
