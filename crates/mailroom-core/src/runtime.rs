use std::sync::Arc;

use anyhow::Context;
use nostr_sdk::prelude::*;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::config::CoreConfig;
use crate::constants::kinds;
use crate::engine::outbound::{deletion_request, mail_rumor};
use crate::engine::{
    ChangeEmitter, ChangeFeed, DeliveryOutcome, Dispatcher, IngestionPipeline, LabelCoordinator,
    LabelMutation, LiveMultiplexer, PendingOperation, PendingOperations, Reconciler, RetryReport,
    SyncDriver, SyncReport,
};
use crate::error::{CoreError, Result};
use crate::events::ChangeEvent;
use crate::models::{Message, TimeRange};
use crate::nostr::{
    AddressResolver, CoverageTracker, EnvelopeCrypto, KeysCrypto, Nip05Resolver, RelayTransport,
    Transport,
};
use crate::stats::{SharedSyncStats, SyncStats};
use crate::store::{purge_message, CoverageStore, Database, MailboxStore};

/// External services the engine depends on.
pub struct Collaborators {
    pub crypto: Arc<dyn EnvelopeCrypto>,
    pub transport: Arc<dyn Transport>,
    pub coverage: Arc<dyn CoverageTracker>,
    pub resolver: Arc<dyn AddressResolver>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub recipient: String,
    /// Envelope for the recipient, then the sender's own copy
    pub envelope_ids: Vec<String>,
}

/// The mailbox engine: one instance per data directory.
pub struct MailroomCore {
    config: CoreConfig,
    identity: RwLock<Option<PublicKey>>,
    db: Database,
    mailbox: MailboxStore,
    crypto: Arc<dyn EnvelopeCrypto>,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn AddressResolver>,
    emitter: ChangeEmitter,
    pipeline: IngestionPipeline,
    driver: SyncDriver,
    live: LiveMultiplexer,
    labels: LabelCoordinator,
    stats: SharedSyncStats,
}

impl MailroomCore {
    pub fn new(config: CoreConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        let db = Database::new(&config.data_dir).with_context(|| {
            format!("Failed to open database in {}", config.data_dir.display())
        })?;
        Self::with_database(config, db, collaborators)
    }

    pub fn with_database(
        config: CoreConfig,
        db: Database,
        collaborators: Collaborators,
    ) -> anyhow::Result<Self> {
        let identity = config.identity_key()?;
        let Collaborators {
            crypto,
            transport,
            coverage,
            resolver,
        } = collaborators;

        let emitter = ChangeEmitter::new();
        let stats = SharedSyncStats::new();
        let namespace = config.label_namespace.clone();
        let relays = config.relays.clone();

        let pipeline = IngestionPipeline::new(db.clone(), crypto.clone(), emitter.clone());
        let reconciler = Reconciler::new(
            db.clone(),
            pipeline.clone(),
            namespace.clone(),
            emitter.clone(),
            stats.clone(),
        );
        let driver = SyncDriver::new(
            transport.clone(),
            coverage,
            reconciler.clone(),
            relays.clone(),
            namespace.clone(),
        );
        let live = LiveMultiplexer::new(
            transport.clone(),
            reconciler,
            emitter.clone(),
            relays.clone(),
            namespace.clone(),
        );
        let dispatcher = Dispatcher::new(
            crypto.clone(),
            transport.clone(),
            relays,
            PendingOperations::new(),
        );
        let labels = LabelCoordinator::new(
            db.clone(),
            crypto.clone(),
            emitter.clone(),
            dispatcher,
            namespace,
        );

        Ok(Self {
            config,
            identity: RwLock::new(identity),
            mailbox: MailboxStore::new(db.clone()),
            db,
            crypto,
            transport,
            resolver,
            emitter,
            pipeline,
            driver,
            live,
            labels,
            stats,
        })
    }

    /// Connect to the configured relays with locally held keys.
    pub async fn connect(config: CoreConfig, keys: Keys) -> anyhow::Result<Self> {
        let db = Database::new(&config.data_dir)?;
        let transport = RelayTransport::connect(
            &config.relays,
            config.query_timeout(),
            config.broadcast_timeout(),
        )
        .await
        .context("Failed to connect to relays")?;

        let collaborators = Collaborators {
            crypto: Arc::new(KeysCrypto::new(keys.clone())),
            transport: Arc::new(transport),
            coverage: Arc::new(CoverageStore::new(db.clone())),
            resolver: Arc::new(Nip05Resolver::new()),
        };
        let core = Self::with_database(config, db, collaborators)?;
        core.set_identity(Some(keys.public_key()));
        info!(identity = %keys.public_key(), "Mailroom connected");
        Ok(core)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn identity(&self) -> Option<PublicKey> {
        *self.identity.read()
    }

    pub fn set_identity(&self, identity: Option<PublicKey>) {
        *self.identity.write() = identity;
    }

    fn me(&self) -> Result<PublicKey> {
        self.identity().ok_or(CoreError::NotConfigured)
    }

    // Synchronisation

    pub async fn sync(&self, since: Option<u64>, until: Option<u64>) -> Result<SyncReport> {
        let me = self.me()?;
        self.driver.sync(&me, TimeRange::window(since, until)).await
    }

    pub async fn resync(&self, since: Option<u64>, until: Option<u64>) -> Result<SyncReport> {
        let me = self.me()?;
        self.driver.resync(&me, TimeRange::window(since, until)).await
    }

    pub async fn fetch_recent(&self) -> Result<SyncReport> {
        let me = self.me()?;
        self.driver.fetch_recent(&me).await
    }

    pub async fn watch(&self) -> Result<ChangeFeed> {
        let me = self.me()?;
        self.live.watch(me).await
    }

    pub async fn stop_watching(&self) {
        self.live.stop_watching().await;
    }

    pub async fn is_watching(&self) -> bool {
        self.live.is_watching().await
    }

    // Retry

    pub async fn retry(&self, envelope_id: &str) -> Result<bool> {
        let me = self.me()?;
        self.pipeline.retry(envelope_id, &me).await
    }

    pub async fn retry_all(&self) -> Result<RetryReport> {
        let me = self.me()?;
        self.pipeline.retry_all(&me).await
    }

    /// Envelopes still waiting for a successful decryption.
    pub fn failed_count(&self) -> Result<usize> {
        self.pipeline.failed_count()
    }

    // Labels

    pub async fn add_label(&self, message_id: &str, label: &str) -> Result<LabelMutation> {
        let me = self.me()?;
        self.labels.add_label(&me, message_id, label).await
    }

    pub async fn remove_label(&self, message_id: &str, label: &str) -> Result<LabelMutation> {
        let me = self.me()?;
        self.labels.remove_label(&me, message_id, label).await
    }

    pub fn has_label(&self, message_id: &str, label: &str) -> Result<bool> {
        self.labels.has_label(message_id, label)
    }

    pub fn labels(&self, message_id: &str) -> Result<Vec<String>> {
        self.labels.labels(message_id)
    }

    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.labels.pending().list()
    }

    pub async fn retry_pending_operations(&self) -> Vec<(String, DeliveryOutcome)> {
        self.labels.retry_pending().await
    }

    // Queries

    pub fn message(&self, id: &str) -> Result<Message> {
        self.mailbox
            .get(id)?
            .ok_or_else(|| CoreError::not_found(id))
    }

    pub fn messages(&self, limit: Option<usize>) -> Result<Vec<Message>> {
        self.mailbox.all(limit)
    }

    pub fn messages_from(&self, sender: &str) -> Result<Vec<Message>> {
        self.mailbox.by_sender(sender)
    }

    pub fn messages_to(&self, recipient: &str) -> Result<Vec<Message>> {
        self.mailbox.by_recipient(recipient)
    }

    pub fn messages_between(&self, since: u64, until: u64) -> Result<Vec<Message>> {
        self.mailbox.between(since, until)
    }

    /// `inbox` holds messages without any folder label.
    pub fn messages_in_folder(&self, folder: &str) -> Result<Vec<Message>> {
        self.mailbox.in_folder(folder)
    }

    pub fn messages_with_label(&self, label: &str) -> Result<Vec<Message>> {
        self.mailbox.with_label(label)
    }

    pub fn unread_count(&self) -> Result<usize> {
        self.mailbox.unread_count()
    }

    // Outbound

    /// Delete a message everywhere. The deletion request is confirmed by a
    /// relay before anything is purged locally.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let me = self.me()?;
        if !self.mailbox.contains(id)? {
            return Err(CoreError::not_found(id));
        }

        let request = self
            .crypto
            .sign(deletion_request(&me, id, kinds::GIFT_WRAP))
            .await?;
        self.transport.broadcast(&request, &self.config.relays).await?;

        if purge_message(&self.db, id)? {
            self.emitter.emit(ChangeEvent::deleted(id));
        }
        info!(message_id = id, "Message deleted");
        Ok(())
    }

    /// Wrap a mail for `to` (public key or NIP-05 address) and keep a copy
    /// wrapped for ourselves.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SentMessage> {
        let me = self.me()?;
        let recipient = self
            .resolver
            .resolve(to)
            .await?
            .ok_or_else(|| CoreError::UnknownRecipient {
                address: to.to_string(),
            })?;

        let rumor = mail_rumor(&me, &recipient, subject, body);
        let mut envelopes = vec![self.crypto.encrypt_for(rumor.clone(), &recipient).await?];
        if recipient != me {
            envelopes.push(self.crypto.encrypt_for(rumor, &me).await?);
        }

        for envelope in &envelopes {
            self.transport.broadcast(envelope, &self.config.relays).await?;
        }
        info!(recipient = %recipient, "Message sent");

        Ok(SentMessage {
            recipient: recipient.to_hex(),
            envelope_ids: envelopes.iter().map(|e| e.id.to_hex()).collect(),
        })
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.snapshot()
    }
}
