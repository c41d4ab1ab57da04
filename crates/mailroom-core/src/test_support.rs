//! Scripted collaborators for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use nostr_sdk::nips::nip59::UnwrappedGift;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;

use crate::constants::kinds;
use crate::engine::outbound::{deletion_request, mail_rumor};
use crate::error::{CoreError, Result};
use crate::models::tag_utils::letter_tag;
use crate::models::time_range::{merge_ranges, uncovered};
use crate::models::{Message, TimeRange};
use crate::nostr::{
    coverage_key, CoverageTracker, DecryptError, EnvelopeCrypto, LogicalQuery, Subscription,
    Transport,
};

/// Scripted decryption result for one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Transient,
    Cancelled,
    Rejected,
}

/// Real NIP-59 crypto over local keys, with per-envelope overrides.
#[derive(Clone)]
pub struct MockCrypto {
    keys: Keys,
    scripts: Arc<Mutex<HashMap<EventId, Script>>>,
}

impl MockCrypto {
    pub fn new(keys: Keys) -> Self {
        Self {
            keys,
            scripts: Arc::default(),
        }
    }

    pub fn script(&self, envelope: &EventId, script: Script) {
        self.scripts.lock().insert(*envelope, script);
    }

    pub fn clear_script(&self, envelope: &EventId) {
        self.scripts.lock().remove(envelope);
    }
}

#[async_trait]
impl EnvelopeCrypto for MockCrypto {
    async fn sign(&self, unsigned: UnsignedEvent) -> Result<Event> {
        unsigned.sign_with_keys(&self.keys).map_err(CoreError::crypto)
    }

    async fn decrypt(&self, envelope: &Event) -> Result<Option<UnsignedEvent>, DecryptError> {
        let script = self.scripts.lock().get(&envelope.id).copied();
        match script {
            Some(Script::Transient) => return Ok(None),
            Some(Script::Cancelled) => return Err(DecryptError::Cancelled),
            Some(Script::Rejected) => return Err(DecryptError::Rejected("denied".to_string())),
            None => {}
        }
        Ok(UnwrappedGift::from_gift_wrap(&self.keys, envelope)
            .await
            .ok()
            .map(|gift| gift.rumor))
    }

    async fn encrypt_for(&self, rumor: UnsignedEvent, recipient: &PublicKey) -> Result<Event> {
        EventBuilder::gift_wrap(&self.keys, recipient, rumor, Vec::<Tag>::new())
            .await
            .map_err(CoreError::crypto)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    Accept,
    Fail,
    /// Never resolves
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedQuery {
    pub query: Option<LogicalQuery>,
    pub since: Option<u64>,
    pub until: Option<u64>,
}

/// In-memory relay. Routes filters back to the logical query they were
/// built from; time bounds are recorded but not applied.
pub struct MockTransport {
    me: PublicKey,
    namespace: String,
    stored: Mutex<HashMap<LogicalQuery, Vec<Event>>>,
    log: Mutex<Vec<IssuedQuery>>,
    failing_queries: Mutex<HashSet<LogicalQuery>>,
    failing_subscribe: Mutex<HashSet<LogicalQuery>>,
    subscriptions: Mutex<HashMap<String, (LogicalQuery, mpsc::UnboundedSender<Event>)>>,
    subscribe_count: AtomicUsize,
    mode: Mutex<BroadcastMode>,
    broadcasts: Mutex<Vec<Event>>,
}

impl MockTransport {
    pub fn new(me: PublicKey, namespace: &str) -> Self {
        Self {
            me,
            namespace: namespace.to_string(),
            stored: Mutex::default(),
            log: Mutex::default(),
            failing_queries: Mutex::default(),
            failing_subscribe: Mutex::default(),
            subscriptions: Mutex::default(),
            subscribe_count: AtomicUsize::new(0),
            mode: Mutex::new(BroadcastMode::Accept),
            broadcasts: Mutex::default(),
        }
    }

    fn route(&self, filter: &Filter) -> Option<LogicalQuery> {
        let mut base = filter.clone();
        base.since = None;
        base.until = None;
        base.limit = None;
        LogicalQuery::ALL
            .into_iter()
            .find(|q| q.filter(&self.me, &self.namespace) == base)
    }

    pub fn add_event(&self, query: LogicalQuery, event: Event) {
        self.stored.lock().entry(query).or_default().push(event);
    }

    /// Deliver `event` on every open subscription for `query`.
    pub fn push(&self, query: LogicalQuery, event: Event) {
        for (q, tx) in self.subscriptions.lock().values() {
            if *q == query {
                let _ = tx.unbounded_send(event.clone());
            }
        }
    }

    pub fn queries(&self) -> Vec<IssuedQuery> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    pub fn fail_queries(&self, query: LogicalQuery) {
        self.failing_queries.lock().insert(query);
    }

    pub fn fail_subscribe(&self, query: LogicalQuery) {
        self.failing_subscribe.lock().insert(query);
    }

    pub fn open_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn set_broadcast_mode(&self, mode: BroadcastMode) {
        *self.mode.lock() = mode;
    }

    /// Accepted broadcasts, in order.
    pub fn broadcasts(&self) -> Vec<Event> {
        self.broadcasts.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn query(&self, filter: Filter, _relays: &[String]) -> Result<Vec<Event>> {
        let query = self.route(&filter);
        self.log.lock().push(IssuedQuery {
            query,
            since: filter.since.map(|t| t.as_u64()),
            until: filter.until.map(|t| t.as_u64()),
        });

        let Some(query) = query else {
            return Ok(Vec::new());
        };
        if self.failing_queries.lock().contains(&query) {
            return Err(CoreError::transport("relay unreachable"));
        }
        Ok(self.stored.lock().get(&query).cloned().unwrap_or_default())
    }

    async fn subscribe(&self, filter: Filter, _relays: &[String]) -> Result<Subscription> {
        let query = self
            .route(&filter)
            .ok_or_else(|| CoreError::transport("unroutable filter"))?;
        if self.failing_subscribe.lock().contains(&query) {
            return Err(CoreError::transport("subscription refused"));
        }

        let n = self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        let id = format!("sub-{}", n);
        let (tx, rx) = mpsc::unbounded();
        self.subscriptions.lock().insert(id.clone(), (query, tx));
        Ok(Subscription {
            id,
            events: rx.boxed(),
        })
    }

    async fn unsubscribe(&self, subscription_id: &str) {
        self.subscriptions.lock().remove(subscription_id);
    }

    async fn broadcast(&self, event: &Event, _relays: &[String]) -> Result<()> {
        let mode = *self.mode.lock();
        match mode {
            BroadcastMode::Accept => {
                self.broadcasts.lock().push(event.clone());
                Ok(())
            }
            BroadcastMode::Fail => Err(CoreError::transport("rejected by relay")),
            BroadcastMode::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryCoverage {
    ranges: Mutex<HashMap<String, Vec<TimeRange>>>,
}

#[async_trait]
impl CoverageTracker for MemoryCoverage {
    async fn has_any_coverage(&self, filter: &Filter) -> Result<bool> {
        Ok(self
            .ranges
            .lock()
            .get(&coverage_key(filter))
            .is_some_and(|r| !r.is_empty()))
    }

    async fn gaps(&self, filter: &Filter, window: TimeRange) -> Result<Vec<TimeRange>> {
        let ranges = self.ranges.lock();
        let covered = ranges.get(&coverage_key(filter)).cloned().unwrap_or_default();
        Ok(uncovered(&covered, window))
    }

    async fn mark_fetched(&self, filter: &Filter, range: TimeRange) -> Result<()> {
        let mut ranges = self.ranges.lock();
        let entry = ranges.entry(coverage_key(filter)).or_default();
        entry.push(range);
        *entry = merge_ranges(std::mem::take(entry));
        Ok(())
    }

    async fn clear(&self, filter: &Filter) -> Result<()> {
        self.ranges.lock().remove(&coverage_key(filter));
        Ok(())
    }
}

pub async fn mail_wrap(sender: &Keys, to: &PublicKey, subject: &str, body: &str) -> Event {
    let rumor = mail_rumor(&sender.public_key(), to, subject, body);
    EventBuilder::gift_wrap(sender, to, rumor, Vec::<Tag>::new())
        .await
        .unwrap()
}

pub async fn chat_wrap(sender: &Keys, to: &PublicKey, text: &str) -> Event {
    let rumor = EventBuilder::new(Kind::from(kinds::CHAT_MESSAGE), text)
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::P),
            vec![to.to_hex()],
        ))
        .build(sender.public_key());
    EventBuilder::gift_wrap(sender, to, rumor, Vec::<Tag>::new())
        .await
        .unwrap()
}

pub fn label_event(author: &Keys, namespace: &str, message_id: &str, labels: &[&str]) -> Event {
    label_event_at(author, namespace, message_id, labels, Timestamp::now().as_u64())
}

pub fn label_event_at(
    author: &Keys,
    namespace: &str,
    message_id: &str,
    labels: &[&str],
    created_at: u64,
) -> Event {
    let mut builder = EventBuilder::new(Kind::from(kinds::LABEL), "").tag(letter_tag(
        SingleLetterTag::uppercase(Alphabet::L),
        vec![namespace.to_string()],
    ));
    for label in labels {
        builder = builder.tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::L),
            vec![label.to_string(), namespace.to_string()],
        ));
    }
    builder
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::E),
            vec![message_id.to_string()],
        ))
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(author)
        .unwrap()
}

fn deletion_event(author: &Keys, targets: &[EventId], kind: u16) -> Event {
    let mut builder = EventBuilder::new(Kind::EventDeletion, "");
    for target in targets {
        builder = builder.tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::E),
            vec![target.to_hex()],
        ));
    }
    builder
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::K),
            vec![kind.to_string()],
        ))
        .sign_with_keys(author)
        .unwrap()
}

pub fn label_deletion_event(author: &Keys, targets: &[EventId]) -> Event {
    deletion_event(author, targets, kinds::LABEL)
}

pub fn message_deletion_event(author: &Keys, targets: &[EventId]) -> Event {
    deletion_event(author, targets, kinds::GIFT_WRAP)
}

/// Single-target deletion request exactly as the engine publishes it.
pub fn published_deletion(author: &Keys, target: &EventId, kind: u16) -> Event {
    deletion_request(&author.public_key(), &target.to_hex(), kind)
        .sign_with_keys(author)
        .unwrap()
}

pub fn sample_message(id: &str) -> Message {
    Message {
        id: id.to_string(),
        sender: "sender".to_string(),
        recipient: "recipient".to_string(),
        subject: "Subject".to_string(),
        body_text: "Body".to_string(),
        raw_body: "Body".to_string(),
        created_at: 1_700_000_000,
    }
}
