//! The shared, multicast change feed.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::warn;

use crate::events::ChangeEvent;

/// Publishing side of the feed, shared by every processor.
///
/// Emitting while no watch session is open is a no-op.
#[derive(Clone, Default)]
pub struct ChangeEmitter {
    tx: Arc<RwLock<Option<broadcast::Sender<ChangeEvent>>>>,
}

impl ChangeEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ChangeEvent) {
        if let Some(tx) = self.tx.read().as_ref() {
            // No receivers is fine
            let _ = tx.send(event);
        }
    }

    pub(crate) fn attach(&self, tx: broadcast::Sender<ChangeEvent>) {
        *self.tx.write() = Some(tx);
    }

    pub(crate) fn detach(&self) {
        *self.tx.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.tx.read().is_some()
    }
}

/// Handle on the feed of one watch session. Clones share the same feed.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    stopped: watch::Receiver<bool>,
}

impl ChangeFeed {
    pub(crate) fn new(tx: broadcast::Sender<ChangeEvent>, stopped: watch::Receiver<bool>) -> Self {
        Self { tx, stopped }
    }

    /// Every change from now on. The stream ends when watching stops.
    ///
    /// The listener is registered before this returns, so nothing emitted
    /// after the call is missed.
    pub fn listen(&self) -> BoxStream<'static, ChangeEvent> {
        let rx = self.tx.subscribe();
        let stopped = self.stopped.clone();

        stream::unfold((rx, stopped), |(mut rx, mut stopped)| async move {
            loop {
                tokio::select! {
                    biased;
                    recv = rx.recv() => match recv {
                        Ok(event) => return Some((event, (rx, stopped))),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Change feed listener lagged");
                        }
                        Err(RecvError::Closed) => return None,
                    },
                    _ = async {
                        // The Ref borrows `stopped`; drop it inside the arm
                        let _ = stopped.wait_for(|stopped| *stopped).await;
                    } => return None,
                }
            }
        })
        .boxed()
    }

    /// Only newly received messages.
    pub fn received(&self) -> BoxStream<'static, ChangeEvent> {
        self.listen()
            .filter(|e| future::ready(matches!(e, ChangeEvent::MessageReceived { .. })))
            .boxed()
    }

    /// Additions and removals of one label.
    pub fn label_changes(&self, label: &str) -> BoxStream<'static, ChangeEvent> {
        let label = label.to_string();
        self.listen()
            .filter(move |e| future::ready(e.label() == Some(label.as_str())))
            .boxed()
    }

    pub fn deletions(&self) -> BoxStream<'static, ChangeEvent> {
        self.listen()
            .filter(|e| future::ready(matches!(e, ChangeEvent::MessageDeleted { .. })))
            .boxed()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Number of listeners currently attached.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
