//! ChangeBus - in-process "active song changed" notifications
//!
//! Carries nothing but the song id; receivers re-fetch the song from the
//! catalog. The subscribe / unsubscribe / broadcast shape is what a networked
//! relay would expose as well, so callers never depend on delivery being
//! local.
//!
//! Listeners registered with `subscribe` run inline on the broadcasting
//! thread, so they must stay short. A consumer that may be slow subscribes
//! with `subscribe_channel` and drains the receiver on its own task; the
//! broadcaster then only pays for an unbounded send.

use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

type ListenerFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Publish/subscribe channel for active-song changes
#[derive(Clone, Default)]
pub struct ChangeBus {
    /// Registered listeners, in subscription order
    listeners: Arc<RwLock<Vec<(SubscriptionId, ListenerFn)>>>,
    next_id: Arc<AtomicU64>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every broadcast issued from now on
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        debug!("Bus subscriber {:?} registered", id);
        id
    }

    /// Receive broadcasts through an unbounded channel
    ///
    /// Delivery never blocks the broadcaster; once the receiver is dropped the
    /// events are discarded until `unsubscribe` is called.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |song_id| {
            let _ = tx.send(song_id.to_string());
        });
        (id, rx)
    }

    /// Remove a listener; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        if listeners.len() < before {
            debug!("Bus subscriber {:?} removed", id);
        }
    }

    /// Number of registered listeners
    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `song_id` to every listener
    ///
    /// Listeners run in subscription order on the calling thread and have all
    /// returned when this does.
    pub fn broadcast(&self, song_id: &str) {
        self.dispatch(None, song_id);
    }

    /// Deliver `song_id` to every listener except `origin`
    ///
    /// Used by a subscriber announcing its own change so it does not receive
    /// the echo.
    pub fn broadcast_from(&self, origin: SubscriptionId, song_id: &str) {
        self.dispatch(Some(origin), song_id);
    }

    fn dispatch(&self, origin: Option<SubscriptionId>, song_id: &str) {
        // Snapshot so listeners may (un)subscribe while we deliver
        let snapshot: Vec<(SubscriptionId, ListenerFn)> = self
            .listeners
            .read()
            .iter()
            .filter(|(id, _)| Some(*id) != origin)
            .cloned()
            .collect();

        debug!("Broadcasting song change '{}' to {} listener(s)", song_id, snapshot.len());

        for (id, listener) in snapshot {
            trace!("Delivering '{}' to {:?}", song_id, id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener(song_id)));
            if let Err(payload) = result {
                error!(
                    "Bus listener {:?} panicked on '{}': {}",
                    id,
                    song_id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
