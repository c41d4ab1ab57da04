//! Live multiplexer: four long-lived subscriptions feeding one change feed.

use std::sync::Arc;

use futures::StreamExt;
use nostr_sdk::prelude::*;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::FEED_CAPACITY;
use crate::engine::feed::{ChangeEmitter, ChangeFeed};
use crate::engine::reconcile::Reconciler;
use crate::error::Result;
use crate::nostr::{LogicalQuery, Subscription, Transport};

struct LiveSession {
    feed: ChangeFeed,
    cancel_tx: watch::Sender<bool>,
    subscription_ids: Vec<String>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct LiveMultiplexer {
    transport: Arc<dyn Transport>,
    reconciler: Reconciler,
    emitter: ChangeEmitter,
    relays: Vec<String>,
    namespace: String,
    session: Mutex<Option<LiveSession>>,
}

impl LiveMultiplexer {
    pub fn new(
        transport: Arc<dyn Transport>,
        reconciler: Reconciler,
        emitter: ChangeEmitter,
        relays: Vec<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            reconciler,
            emitter,
            relays,
            namespace: namespace.into(),
            session: Mutex::new(None),
        }
    }

    /// The shared feed, opening the subscriptions on first use.
    ///
    /// Subscriptions only carry new events; run a sync first to catch up.
    pub async fn watch(&self, me: PublicKey) -> Result<ChangeFeed> {
        let mut session = self.session.lock().await;
        if let Some(active) = session.as_ref() {
            return Ok(active.feed.clone());
        }

        let mut subscriptions: Vec<(LogicalQuery, Subscription)> = Vec::new();
        for query in LogicalQuery::ALL {
            let filter = query.filter(&me, &self.namespace).limit(0);
            match self.transport.subscribe(filter, &self.relays).await {
                Ok(subscription) => subscriptions.push((query, subscription)),
                Err(e) => {
                    // Roll back the ones already opened
                    for (_, opened) in &subscriptions {
                        self.transport.unsubscribe(&opened.id).await;
                    }
                    return Err(e);
                }
            }
        }

        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.emitter.attach(tx.clone());

        let mut subscription_ids = Vec::with_capacity(subscriptions.len());
        let mut tasks = Vec::with_capacity(subscriptions.len());
        for (query, subscription) in subscriptions {
            subscription_ids.push(subscription.id.clone());
            tasks.push(self.spawn_pump(query, subscription, me, cancel_rx.clone()));
        }

        let feed = ChangeFeed::new(tx, cancel_rx);
        *session = Some(LiveSession {
            feed: feed.clone(),
            cancel_tx,
            subscription_ids,
            tasks,
        });
        info!("Live feed started");
        Ok(feed)
    }

    /// Tear down all subscriptions and end every listener's stream.
    /// A later `watch` opens fresh subscriptions.
    pub async fn stop_watching(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        let _ = session.cancel_tx.send(true);
        for id in &session.subscription_ids {
            self.transport.unsubscribe(id).await;
        }
        self.emitter.detach();

        for task in session.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Subscription task ended abnormally");
            }
        }
        info!("Live feed stopped");
    }

    pub async fn is_watching(&self) -> bool {
        self.session.lock().await.is_some()
    }

    fn spawn_pump(
        &self,
        query: LogicalQuery,
        subscription: Subscription,
        me: PublicKey,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let reconciler = self.reconciler.clone();
        let Subscription { id, mut events } = subscription;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    next = events.next() => match next {
                        Some(event) => {
                            if let Err(e) = reconciler.apply_in_batch(query, &event, &me).await {
                                warn!(%query, event_id = %event.id, error = %e, "Failed to apply live event");
                            }
                        }
                        None => {
                            debug!(%query, subscription = %id, "Subscription stream ended");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ingest::IngestionPipeline;
    use crate::events::ChangeEvent;
    use crate::stats::SharedSyncStats;
    use crate::store::{Database, LabelStore};
    use crate::test_support::{label_deletion_event, label_event, mail_wrap, MockCrypto, MockTransport};

    const NS: &str = "mailroom";

    fn multiplexer(me: &Keys) -> (LiveMultiplexer, Arc<MockTransport>, Database) {
        let db = Database::open_in_memory().unwrap();
        let transport = Arc::new(MockTransport::new(me.public_key(), NS));
        let emitter = ChangeEmitter::new();
        let pipeline = IngestionPipeline::new(
            db.clone(),
            Arc::new(MockCrypto::new(me.clone())),
            emitter.clone(),
        );
        let reconciler =
            Reconciler::new(db.clone(), pipeline, NS, emitter.clone(), SharedSyncStats::new());
        let live = LiveMultiplexer::new(transport.clone(), reconciler, emitter, Vec::new(), NS);
        (live, transport, db)
    }

    #[tokio::test]
    async fn test_watch_opens_four_subscriptions_once() {
        let me = Keys::generate();
        let (live, transport, _db) = multiplexer(&me);

        let _a = live.watch(me.public_key()).await.unwrap();
        let _b = live.watch(me.public_key()).await.unwrap();

        assert_eq!(transport.open_subscriptions(), 4);
        assert_eq!(transport.subscribe_count(), 4);
        assert!(live.is_watching().await);
    }

    #[tokio::test]
    async fn test_live_events_reach_every_listener() {
        let me = Keys::generate();
        let (live, transport, _db) = multiplexer(&me);

        let feed = live.watch(me.public_key()).await.unwrap();
        let mut first = feed.listen();
        let mut second = feed.listen();

        let wrap = mail_wrap(&Keys::generate(), &me.public_key(), "Hello", "b").await;
        transport.push(LogicalQuery::Messages, wrap.clone());

        for listener in [&mut first, &mut second] {
            match listener.next().await {
                Some(ChangeEvent::MessageReceived { id, subject, .. }) => {
                    assert_eq!(id, wrap.id.to_hex());
                    assert_eq!(subject, "Hello");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_live_envelope_emits_once() {
        let me = Keys::generate();
        let (live, transport, _db) = multiplexer(&me);
        let feed = live.watch(me.public_key()).await.unwrap();
        let mut listener = feed.listen();

        let wrap = mail_wrap(&Keys::generate(), &me.public_key(), "s", "b").await;
        transport.push(LogicalQuery::Messages, wrap.clone());
        transport.push(LogicalQuery::Messages, wrap);

        assert!(matches!(
            listener.next().await,
            Some(ChangeEvent::MessageReceived { .. })
        ));

        let label = label_event(&me, NS, "m1", &["flag:starred"]);
        transport.push(LogicalQuery::Labels, label);
        // The next change is the label, not a second MessageReceived
        assert!(matches!(
            listener.next().await,
            Some(ChangeEvent::LabelAdded { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_label_flow() {
        let me = Keys::generate();
        let (live, transport, db) = multiplexer(&me);
        let feed = live.watch(me.public_key()).await.unwrap();
        let mut changes = feed.label_changes("folder:trash");

        let label = label_event(&me, NS, "m1", &["folder:trash"]);
        transport.push(LogicalQuery::Labels, label.clone());
        assert!(matches!(changes.next().await, Some(ChangeEvent::LabelAdded { .. })));

        transport.push(LogicalQuery::LabelDeletions, label_deletion_event(&me, &[label.id]));
        assert!(matches!(changes.next().await, Some(ChangeEvent::LabelRemoved { .. })));
        assert_eq!(LabelStore::new(db).count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_watching_tears_down() {
        let me = Keys::generate();
        let (live, transport, _db) = multiplexer(&me);
        let feed = live.watch(me.public_key()).await.unwrap();
        let mut listener = feed.listen();

        live.stop_watching().await;

        assert_eq!(transport.open_subscriptions(), 0);
        assert!(!live.is_watching().await);
        assert!(listener.next().await.is_none());

        // A new watch opens fresh subscriptions
        let _feed = live.watch(me.public_key()).await.unwrap();
        assert_eq!(transport.open_subscriptions(), 4);
        assert_eq!(transport.subscribe_count(), 8);
    }

    #[tokio::test]
    async fn test_failed_subscribe_rolls_back() {
        let me = Keys::generate();
        let (live, transport, _db) = multiplexer(&me);
        transport.fail_subscribe(LogicalQuery::Labels);

        assert!(live.watch(me.public_key()).await.is_err());
        assert_eq!(transport.open_subscriptions(), 0);
        assert!(!live.is_watching().await);
    }
}
