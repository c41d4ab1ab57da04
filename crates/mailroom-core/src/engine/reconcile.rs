use nostr_sdk::prelude::*;
use tracing::{debug, warn};

use crate::constants::kinds;
use crate::engine::feed::ChangeEmitter;
use crate::engine::ingest::IngestionPipeline;
use crate::error::{CoreError, Result};
use crate::events::ChangeEvent;
use crate::models::{validate_label, DeletionRequest, LabelAssertion, LabelUpsert, ParsedEvent};
use crate::nostr::LogicalQuery;
use crate::stats::SharedSyncStats;
use crate::store::{purge_message, Database, LabelStore};

/// Routes events from any of the four streams to the processor for their
/// kind. Shared by historical sync and live subscriptions.
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    labels: LabelStore,
    pipeline: IngestionPipeline,
    namespace: String,
    emitter: ChangeEmitter,
    stats: SharedSyncStats,
}

impl Reconciler {
    pub fn new(
        db: Database,
        pipeline: IngestionPipeline,
        namespace: impl Into<String>,
        emitter: ChangeEmitter,
        stats: SharedSyncStats,
    ) -> Self {
        Self {
            labels: LabelStore::new(db.clone()),
            db,
            pipeline,
            namespace: namespace.into(),
            emitter,
            stats,
        }
    }

    pub async fn apply(&self, query: LogicalQuery, event: &Event, me: &PublicKey) -> Result<()> {
        self.stats.record(query, |s| s.events_seen += 1);

        match (query, ParsedEvent::from_event(event)) {
            (LogicalQuery::Messages, ParsedEvent::Envelope(header)) => {
                let outcome = self.pipeline.ingest_parsed(event, &header, me).await?;
                self.stats.record(query, |s| s.record_outcome(&outcome));
            }
            (LogicalQuery::Labels, ParsedEvent::LabelAssertion(assertion)) => {
                self.apply_labels(&assertion, me)?;
            }
            (LogicalQuery::MessageDeletions, ParsedEvent::Deletion(request)) => {
                self.apply_message_deletion(&request, me)?;
            }
            (LogicalQuery::LabelDeletions, ParsedEvent::Deletion(request)) => {
                self.apply_label_deletion(&request, me)?;
            }
            (query, parsed) => {
                debug!(%query, ?parsed, "Event does not belong to this stream");
            }
        }
        Ok(())
    }

    /// `apply` for bulk paths: a user cancellation leaves the envelope
    /// unprocessed and does not abort the batch.
    pub async fn apply_in_batch(
        &self,
        query: LogicalQuery,
        event: &Event,
        me: &PublicKey,
    ) -> Result<()> {
        match self.apply(query, event, me).await {
            Err(CoreError::Cancelled) => {
                warn!(%query, envelope_id = %event.id, "Decryption cancelled, left for retry");
                Ok(())
            }
            other => other,
        }
    }

    /// Upsert every (message, label) pair the event asserts in our namespace.
    /// Last seen wins for the originating event id; retracted events never
    /// come back.
    fn apply_labels(&self, assertion: &LabelAssertion, me: &PublicKey) -> Result<()> {
        if assertion.author != me.to_hex() {
            debug!(event_id = %assertion.event_id, "Label event from another author");
            return Ok(());
        }

        let labels = assertion.labels_in(&self.namespace);
        for message_id in &assertion.message_ids {
            for label in &labels {
                if validate_label(label).is_err() {
                    continue;
                }
                match self
                    .labels
                    .apply_remote(message_id, label, &assertion.event_id)?
                {
                    LabelUpsert::Inserted => {
                        self.emitter.emit(ChangeEvent::label_added(message_id, label));
                        self.stats
                            .record(LogicalQuery::Labels, |s| s.labels_applied += 1);
                    }
                    LabelUpsert::Retracted => {
                        debug!(event_id = %assertion.event_id, %label, "Skipping retracted label event");
                    }
                    LabelUpsert::Replaced { .. } | LabelUpsert::Unchanged => {}
                }
            }
        }
        Ok(())
    }

    fn apply_label_deletion(&self, request: &DeletionRequest, me: &PublicKey) -> Result<()> {
        if request.author != me.to_hex() || !request.targets_kind(kinds::LABEL) {
            return Ok(());
        }

        for target in &request.target_ids {
            // Unknown targets (never seen, or already removed) are no-ops
            for removed in self.labels.remove_by_event(target)? {
                self.emitter
                    .emit(ChangeEvent::label_removed(&removed.message_id, &removed.label));
                self.stats
                    .record(LogicalQuery::LabelDeletions, |s| s.labels_removed += 1);
            }
        }
        Ok(())
    }

    fn apply_message_deletion(&self, request: &DeletionRequest, me: &PublicKey) -> Result<()> {
        if request.author != me.to_hex() || !request.targets_kind(kinds::GIFT_WRAP) {
            return Ok(());
        }

        for target in &request.target_ids {
            if purge_message(&self.db, target)? {
                debug!(message_id = %target, "Purged remotely deleted message");
                self.emitter.emit(ChangeEvent::deleted(target));
                self.stats
                    .record(LogicalQuery::MessageDeletions, |s| s.messages_deleted += 1);
            }
        }
        Ok(())
    }
}
