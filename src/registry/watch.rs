//! Prefix subscriptions for setting changes.
//!
//! Every subscriber owns an unbounded queue. A writer never waits on a slow
//! subscriber and a subscriber never misses an event; the cost is that an
//! abandoned-but-not-dropped stream keeps accumulating changes in memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::metrics::{SETTINGS_WATCH_EVENTS_TOTAL, SETTINGS_WATCH_SUBSCRIBERS};

use super::types::SettingChange;

struct Subscriber {
    prefix: String,
    tx: mpsc::UnboundedSender<SettingChange>,
}

/// Registry of active watch subscriptions.
#[derive(Default)]
pub(crate) struct WatchHub {
    subscribers: DashMap<u64, Subscriber>,
    next_id: AtomicU64,
}

impl WatchHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Queue `change` for every subscriber whose prefix matches its key.
    pub(crate) fn publish(&self, change: &SettingChange) {
        for entry in self.subscribers.iter() {
            if !change.key.starts_with(&entry.prefix) {
                continue;
            }
            // A send error means the receiver is gone; its guard removes the entry
            if entry.tx.send(change.clone()).is_ok() {
                SETTINGS_WATCH_EVENTS_TOTAL.inc();
            }
        }
    }

    fn subscribe(&self, prefix: String) -> (u64, mpsc::UnboundedReceiver<SettingChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, Subscriber { prefix, tx });
        (id, rx)
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }
}

/// Register a subscription now and return the stream of its changes.
///
/// Changes written after this call returns are delivered, even if the stream
/// is first polled later. Dropping the stream removes the subscription.
pub(crate) fn subscribe(
    hub: Arc<WatchHub>,
    prefix: String,
) -> impl Stream<Item = SettingChange> + Send + 'static {
    let (id, rx) = hub.subscribe(prefix.clone());
    SETTINGS_WATCH_SUBSCRIBERS.inc();
    tracing::debug!(subscription = id, prefix = %prefix, "Watch subscription opened");

    let guard = WatchGuard { hub, id };
    let mut changes = UnboundedReceiverStream::new(rx);

    async_stream::stream! {
        // Held for the lifetime of the stream
        let _guard = guard;

        while let Some(change) = changes.next().await {
            yield change;
        }
    }
}

/// Removes the subscription when the stream is dropped
struct WatchGuard {
    hub: Arc<WatchHub>,
    id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
        SETTINGS_WATCH_SUBSCRIBERS.dec();
        tracing::debug!(subscription = self.id, "Watch subscription closed");
    }
}
