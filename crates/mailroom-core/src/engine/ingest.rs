//! Envelope ingestion state machine.
//!
//! `unknown -> unprocessed -> processed`, where an envelope may stay
//! `unprocessed` indefinitely after a transient decryption failure until a
//! retry reaches it again.

use std::sync::Arc;

use nostr_sdk::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::feed::ChangeEmitter;
use crate::error::{CoreError, Result};
use crate::events::ChangeEvent;
use crate::models::{EnvelopeHeader, IngestOutcome, Message, RumorError};
use crate::nostr::{DecryptError, EnvelopeCrypto};
use crate::store::{commit_message, Database, EnvelopeLedger};

#[derive(Clone)]
pub struct IngestionPipeline {
    db: Database,
    ledger: EnvelopeLedger,
    crypto: Arc<dyn EnvelopeCrypto>,
    emitter: ChangeEmitter,
}

/// Result of a sweep over every unprocessed envelope.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub stored: usize,
    pub still_pending: usize,
}

impl IngestionPipeline {
    pub fn new(db: Database, crypto: Arc<dyn EnvelopeCrypto>, emitter: ChangeEmitter) -> Self {
        Self {
            ledger: EnvelopeLedger::new(db.clone()),
            db,
            crypto,
            emitter,
        }
    }

    /// Run a freshly observed envelope through the pipeline.
    ///
    /// Only the first caller for a given envelope id gets past the ledger
    /// gate; everyone else sees `Duplicate`.
    pub async fn ingest(&self, envelope: &Event, me: &PublicKey) -> Result<IngestOutcome> {
        self.ingest_parsed(envelope, &EnvelopeHeader::from_event(envelope), me)
            .await
    }

    /// `ingest` for an envelope whose header was already projected.
    pub async fn ingest_parsed(
        &self,
        envelope: &Event,
        header: &EnvelopeHeader,
        me: &PublicKey,
    ) -> Result<IngestOutcome> {
        if !self.ledger.record_if_new(
            &header.id,
            header.recipient.as_deref(),
            &envelope.as_json(),
        )? {
            return Ok(IngestOutcome::Duplicate);
        }

        self.process(header, envelope, me).await
    }

    /// Re-run the state machine for a stored unprocessed envelope.
    ///
    /// Returns whether a message was stored. Unknown or already processed
    /// ids return `false`.
    pub async fn retry(&self, envelope_id: &str, me: &PublicKey) -> Result<bool> {
        let Some(raw) = self.ledger.get_unprocessed(envelope_id)? else {
            return Ok(false);
        };
        let envelope = parse_raw(envelope_id, &raw)?;
        let header = EnvelopeHeader::from_event(&envelope);
        let outcome = self.process(&header, &envelope, me).await?;
        Ok(outcome.is_stored())
    }

    /// Retry every unprocessed envelope. A cancellation stops the sweep.
    pub async fn retry_all(&self, me: &PublicKey) -> Result<RetryReport> {
        let pending = self.ledger.list_unprocessed(None)?;
        let mut report = RetryReport::default();

        for raw in pending {
            let envelope = match Event::from_json(&raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable stored envelope");
                    report.still_pending += 1;
                    continue;
                }
            };
            let header = EnvelopeHeader::from_event(&envelope);
            report.attempted += 1;

            match self.process(&header, &envelope, me).await? {
                IngestOutcome::Stored(_) => report.stored += 1,
                IngestOutcome::Deferred | IngestOutcome::NotAddressedToUs => {
                    report.still_pending += 1
                }
                _ => {}
            }
        }

        info!(
            attempted = report.attempted,
            stored = report.stored,
            still_pending = report.still_pending,
            "Retry sweep finished"
        );
        Ok(report)
    }

    pub fn failed_count(&self) -> Result<usize> {
        self.ledger.count_unprocessed()
    }

    pub fn ledger(&self) -> &EnvelopeLedger {
        &self.ledger
    }

    async fn process(
        &self,
        header: &EnvelopeHeader,
        envelope: &Event,
        me: &PublicKey,
    ) -> Result<IngestOutcome> {
        let id = header.id.as_str();
        if header.recipient.as_deref() != Some(me.to_hex().as_str()) {
            debug!(envelope_id = id, "Envelope addressed to another identity");
            return Ok(IngestOutcome::NotAddressedToUs);
        }

        let rumor = match self.crypto.decrypt(envelope).await {
            Ok(Some(rumor)) => rumor,
            Ok(None) => {
                debug!(envelope_id = id, "Decryption unavailable, will retry");
                return Ok(IngestOutcome::Deferred);
            }
            Err(DecryptError::Cancelled) => return Err(CoreError::Cancelled),
            Err(DecryptError::Rejected(reason)) => {
                warn!(envelope_id = id, reason = %reason, "Signer rejected decryption");
                self.ledger.mark_processed(id)?;
                return Ok(IngestOutcome::Rejected);
            }
        };

        match Message::from_rumor(id, &rumor) {
            Ok(message) => {
                commit_message(&self.db, &message)?;
                debug!(envelope_id = id, sender = %message.sender, "Stored message");
                self.emitter.emit(ChangeEvent::received(&message));
                Ok(IngestOutcome::Stored(message))
            }
            Err(RumorError::NotMail { kind }) => {
                debug!(envelope_id = id, kind, "Not mail");
                self.ledger.mark_processed(id)?;
                Ok(IngestOutcome::NotMail { kind })
            }
            Err(RumorError::MissingRecipient) => {
                warn!(envelope_id = id, "Mail without recipient tag");
                self.ledger.mark_processed(id)?;
                Ok(IngestOutcome::Malformed)
            }
        }
    }
}

fn parse_raw(id: &str, raw: &str) -> Result<Event> {
    Event::from_json(raw).map_err(|e| CoreError::CorruptRecord {
        id: id.to_string(),
        message: e.to_string(),
    })
}
