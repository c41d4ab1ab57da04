//! Relay transport contract and its nostr-sdk implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use nostr_sdk::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};

/// A live subscription: its relay-side id and the events it delivers.
pub struct Subscription {
    pub id: String,
    pub events: BoxStream<'static, Event>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Pub/sub network access. An empty relay list means "every connected relay".
#[async_trait]
pub trait Transport: Send + Sync {
    /// Historical query; resolves once relays have answered or timed out.
    async fn query(&self, filter: Filter, relays: &[String]) -> Result<Vec<Event>>;

    /// Long-lived subscription. Events arrive in relay delivery order.
    async fn subscribe(&self, filter: Filter, relays: &[String]) -> Result<Subscription>;

    async fn unsubscribe(&self, subscription_id: &str);

    /// Publish `event`; `Ok` once at least one relay accepted it.
    async fn broadcast(&self, event: &Event, relays: &[String]) -> Result<()>;
}

pub struct RelayTransport {
    client: Client,
    query_timeout: Duration,
    broadcast_timeout: Duration,
}

impl RelayTransport {
    pub fn new(client: Client, query_timeout: Duration, broadcast_timeout: Duration) -> Self {
        Self {
            client,
            query_timeout,
            broadcast_timeout,
        }
    }

    /// Connect to `relays` and wait until at least one of them is up.
    pub async fn connect(
        relays: &[String],
        query_timeout: Duration,
        broadcast_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::default();
        for url in relays {
            client
                .add_relay(url.as_str())
                .await
                .map_err(CoreError::transport)?;
        }

        let connect_start = std::time::Instant::now();
        if tokio::time::timeout(Duration::from_secs(10), client.connect())
            .await
            .is_err()
        {
            return Err(CoreError::Transport {
                message: format!("connection timed out after {:?}", connect_start.elapsed()),
            });
        }

        // Relay status flips asynchronously after connect() returns
        let verify_timeout = Duration::from_secs(5);
        let verify_start = std::time::Instant::now();
        loop {
            let connected = client
                .relays()
                .await
                .values()
                .filter(|r| r.status() == RelayStatus::Connected)
                .count();

            if connected > 0 {
                info!(connected, elapsed = ?connect_start.elapsed(), "Relays connected");
                break;
            }
            if verify_start.elapsed() >= verify_timeout {
                return Err(CoreError::Transport {
                    message: format!("no relays connected after {:?}", verify_timeout),
                });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Ok(Self::new(client, query_timeout, broadcast_timeout))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn query(&self, filter: Filter, relays: &[String]) -> Result<Vec<Event>> {
        let events = if relays.is_empty() {
            self.client.fetch_events(filter, self.query_timeout).await
        } else {
            self.client
                .fetch_events_from(relays.to_vec(), filter, self.query_timeout)
                .await
        }
        .map_err(CoreError::transport)?;

        Ok(events.into_iter().collect())
    }

    async fn subscribe(&self, filter: Filter, relays: &[String]) -> Result<Subscription> {
        // Take the receiver before subscribing so no event slips through
        let notifications = self.client.notifications();

        let output = if relays.is_empty() {
            self.client.subscribe(filter, None).await
        } else {
            self.client.subscribe_to(relays.to_vec(), filter, None).await
        }
        .map_err(CoreError::transport)?;

        let sub_id = output.val;
        let id = sub_id.to_string();
        debug!(subscription = %id, "Subscribed");

        let events = stream::unfold((notifications, sub_id), |(mut rx, sub_id)| async move {
            loop {
                match rx.recv().await {
                    Ok(RelayPoolNotification::Event {
                        subscription_id,
                        event,
                        ..
                    }) => {
                        if subscription_id == sub_id {
                            return Some((*event, (rx, sub_id)));
                        }
                    }
                    Ok(RelayPoolNotification::Shutdown) => return None,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(subscription = %sub_id, skipped, "Notification receiver lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        Ok(Subscription { id, events })
    }

    async fn unsubscribe(&self, subscription_id: &str) {
        let id = SubscriptionId::new(subscription_id);
        let _ = self.client.unsubscribe(&id).await;
    }

    async fn broadcast(&self, event: &Event, relays: &[String]) -> Result<()> {
        let result = if relays.is_empty() {
            tokio::time::timeout(self.broadcast_timeout, self.client.send_event(event)).await
        } else {
            tokio::time::timeout(
                self.broadcast_timeout,
                self.client.send_event_to(relays.to_vec(), event),
            )
            .await
        };

        match result {
            Ok(Ok(output)) if !output.success.is_empty() => {
                debug!(event_id = %output.id(), accepted = output.success.len(), "Broadcast");
                Ok(())
            }
            Ok(Ok(output)) => Err(CoreError::Transport {
                message: output
                    .failed
                    .values()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| "no relay accepted the event".to_string()),
            }),
            Ok(Err(e)) => Err(CoreError::transport(e)),
            Err(_) => Err(CoreError::Transport {
                message: format!("broadcast timed out after {:?}", self.broadcast_timeout),
            }),
        }
    }
}
