//! Live signal feed.
//!
//! Every connected subscriber owns a bounded queue. Publishing never
//! waits: a subscriber whose queue is full or closed is dropped on the
//! spot and the remaining subscribers still receive the message.

mod server;

pub use server::{bind_feed, run_feed_server};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Identifier handed out by [`SubscriberFeed::subscribe`].
pub type SubscriberId = u64;

#[derive(Debug, Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, mpsc::Sender<String>>,
}

/// Cloneable handle to the subscriber registry.
#[derive(Debug, Clone)]
pub struct SubscriberFeed {
    registry: Arc<Mutex<Registry>>,
    buffer: usize,
}

impl SubscriberFeed {
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            buffer: buffer.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.insert(id, tx);
        debug!(subscriber = id, total = registry.subscribers.len(), "Feed subscriber added");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.registry().subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "Feed subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Offer `message` to every subscriber; returns how many accepted it.
    pub fn publish(&self, message: &str) -> usize {
        let mut registry = self.registry();
        let mut delivered = 0;

        registry.subscribers.retain(|id, tx| match tx.try_send(message.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = id, "Feed subscriber is not keeping up, dropping it");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = id, "Feed subscriber went away");
                false
            }
        });

        trace!(delivered, "Feed message published");
        delivered
    }
}
