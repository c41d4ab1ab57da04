//! Outbound operations whose network delivery has not been confirmed.
//!
//! Local state has already advanced when an operation lands here. Failed
//! operations stay listed until `retry_failed` gets them through; nothing
//! is retried automatically.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::nostr::{EnvelopeCrypto, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    LabelAssertion,
    LabelRetraction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    InFlight,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Confirmed,
    Failed(String),
}

/// Where a local-first mutation stands relative to the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Committed locally, delivery still in flight
    Local,
    LocalAndConfirmed,
    LocalAndFailed { reason: String },
}

impl From<DeliveryOutcome> for MutationState {
    fn from(outcome: DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Confirmed => MutationState::LocalAndConfirmed,
            DeliveryOutcome::Failed(reason) => MutationState::LocalAndFailed { reason },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingOperation {
    pub id: String,
    pub kind: OperationKind,
    pub message_id: String,
    pub label: String,
    pub status: OperationStatus,
    pub attempts: u32,
    pub created_at: u64,
    #[serde(skip)]
    unsigned: UnsignedEvent,
    #[serde(skip)]
    signed: Option<Event>,
}

/// Receiver for the delivery outcome of one operation.
#[derive(Debug)]
pub struct PendingDelivery {
    operation_id: String,
    rx: oneshot::Receiver<DeliveryOutcome>,
    settled: Option<DeliveryOutcome>,
}

impl PendingDelivery {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Non-blocking look at the delivery.
    pub fn state(&mut self) -> MutationState {
        if self.settled.is_none() {
            match self.rx.try_recv() {
                Ok(outcome) => self.settled = Some(outcome),
                Err(TryRecvError::Empty) => return MutationState::Local,
                Err(TryRecvError::Closed) => {
                    self.settled = Some(DeliveryOutcome::Failed(dropped_reason()))
                }
            }
        }
        self.settled
            .clone()
            .map(MutationState::from)
            .unwrap_or(MutationState::Local)
    }

    pub async fn outcome(self) -> DeliveryOutcome {
        if let Some(outcome) = self.settled {
            return outcome;
        }
        self.rx
            .await
            .unwrap_or_else(|_| DeliveryOutcome::Failed(dropped_reason()))
    }
}

fn dropped_reason() -> String {
    "delivery task dropped".to_string()
}

#[derive(Clone, Default)]
pub struct PendingOperations {
    inner: Arc<Mutex<HashMap<String, PendingOperation>>>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<PendingOperation> {
        let mut ops: Vec<_> = self.inner.lock().values().cloned().collect();
        ops.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ops
    }

    pub fn failed(&self) -> Vec<PendingOperation> {
        self.list()
            .into_iter()
            .filter(|op| matches!(op.status, OperationStatus::Failed { .. }))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<PendingOperation> {
        self.inner.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn insert(&self, op: PendingOperation) {
        self.inner.lock().insert(op.id.clone(), op);
    }

    /// Flip to in-flight and hand out what is needed to send it.
    fn begin_attempt(&self, id: &str) -> Option<(UnsignedEvent, Option<Event>)> {
        let mut ops = self.inner.lock();
        let op = ops.get_mut(id)?;
        op.status = OperationStatus::InFlight;
        op.attempts += 1;
        Some((op.unsigned.clone(), op.signed.clone()))
    }

    fn set_signed(&self, id: &str, event: Event) {
        if let Some(op) = self.inner.lock().get_mut(id) {
            op.signed = Some(event);
        }
    }

    fn confirm(&self, id: &str) {
        self.inner.lock().remove(id);
    }

    fn fail(&self, id: &str, reason: &str) {
        if let Some(op) = self.inner.lock().get_mut(id) {
            op.status = OperationStatus::Failed {
                reason: reason.to_string(),
            };
        }
    }
}

/// Signs (when needed) and broadcasts queued operations in the background.
#[derive(Clone)]
pub struct Dispatcher {
    crypto: Arc<dyn EnvelopeCrypto>,
    transport: Arc<dyn Transport>,
    relays: Vec<String>,
    pending: PendingOperations,
}

impl Dispatcher {
    pub fn new(
        crypto: Arc<dyn EnvelopeCrypto>,
        transport: Arc<dyn Transport>,
        relays: Vec<String>,
        pending: PendingOperations,
    ) -> Self {
        Self {
            crypto,
            transport,
            relays,
            pending,
        }
    }

    pub fn pending(&self) -> &PendingOperations {
        &self.pending
    }

    /// Queue an operation and start delivering it without waiting.
    pub fn dispatch(
        &self,
        kind: OperationKind,
        message_id: &str,
        label: &str,
        unsigned: UnsignedEvent,
        signed: Option<Event>,
    ) -> PendingDelivery {
        let id = uuid::Uuid::new_v4().to_string();
        self.pending.insert(PendingOperation {
            id: id.clone(),
            kind,
            message_id: message_id.to_string(),
            label: label.to_string(),
            status: OperationStatus::InFlight,
            attempts: 0,
            created_at: Timestamp::now().as_u64(),
            unsigned,
            signed,
        });

        let (tx, rx) = oneshot::channel();
        let dispatcher = self.clone();
        let operation_id = id.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.deliver(&operation_id).await;
            let _ = tx.send(outcome);
        });

        PendingDelivery {
            operation_id: id,
            rx,
            settled: None,
        }
    }

    /// Re-send every failed operation, concurrently, and wait for all.
    pub async fn retry_failed(&self) -> Vec<(String, DeliveryOutcome)> {
        let ids: Vec<String> = self.pending.failed().into_iter().map(|op| op.id).collect();
        let outcomes = join_all(ids.iter().map(|id| self.deliver(id))).await;
        ids.into_iter().zip(outcomes).collect()
    }

    async fn deliver(&self, id: &str) -> DeliveryOutcome {
        let Some((unsigned, signed)) = self.pending.begin_attempt(id) else {
            return DeliveryOutcome::Failed(format!("unknown operation {}", id));
        };

        let event = match signed {
            Some(event) => event,
            None => match self.crypto.sign(unsigned).await {
                Ok(event) => {
                    self.pending.set_signed(id, event.clone());
                    event
                }
                Err(e) => return self.failed(id, e.to_string()),
            },
        };

        match self.transport.broadcast(&event, &self.relays).await {
            Ok(()) => {
                debug!(operation = id, event_id = %event.id, "Delivery confirmed");
                self.pending.confirm(id);
                DeliveryOutcome::Confirmed
            }
            Err(e) => self.failed(id, e.to_string()),
        }
    }

    fn failed(&self, id: &str, reason: String) -> DeliveryOutcome {
        warn!(operation = id, reason = %reason, "Delivery failed");
        self.pending.fail(id, &reason);
        DeliveryOutcome::Failed(reason)
    }
}
