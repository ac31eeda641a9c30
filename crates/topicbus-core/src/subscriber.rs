//! Subscriber handles.
//!
//! A [`Subscriber`] owns its topic set and a delivery callback. The bus keeps
//! a reverse index from topic to subscriber; both sides are updated together
//! under the subscriber lock followed by the registry lock, always in that
//! order.
//!
//! Dropping a `Subscriber` unsubscribes it from every topic.

use crate::bus::{dispatch_async, Bus};
use crate::message::Message;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique subscriber identity.
///
/// Equality is identity: two subscribers bound to the same topics still have
/// different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = dyn Fn(&Message) + Send + Sync;

/// State shared between a subscriber handle and the registry.
pub(crate) struct SubscriberShared {
    id: SubscriberId,
    topics: Mutex<HashSet<String>>,
    callback: Box<Callback>,
}

impl SubscriberShared {
    pub(crate) fn new<F>(callback: F) -> Arc<Self>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: SubscriberId::next(),
            topics: Mutex::new(HashSet::new()),
            callback: Box::new(callback),
        })
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn deliver(&self, msg: &Message) {
        (self.callback)(msg);
    }
}

/// A registered interest in one or more topics.
///
/// Created with [`Bus::subscriber`]. Messages published to a subscribed topic
/// or to any of its descendants invoke the callback.
pub struct Subscriber {
    shared: Arc<SubscriberShared>,
    bus: Bus,
}

impl Subscriber {
    pub(crate) fn new<F>(bus: Bus, callback: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Self {
            shared: SubscriberShared::new(callback),
            bus,
        }
    }

    /// Identity of this subscriber.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.shared.id
    }

    /// Subscribe to topics, e.g. `sub.subscribe(["foo.bar", "fizz.buzz"])`.
    ///
    /// Subscribing to a topic twice is a no-op. When a topic has a persisted
    /// message, a newly added subscription receives it once, asynchronously,
    /// with `is_replay` set.
    pub fn subscribe<I, S>(&self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        let mut replays = Vec::new();
        {
            let mut own = self.shared.topics.lock();
            let mut registry = self.bus.inner.registry.lock();
            for topic in topics {
                let topic = topic.as_ref();
                registry.bind(topic, &self.shared);
                if own.insert(topic.to_owned()) {
                    if let Some(cached) = registry.persisted(topic) {
                        replays.push(cached);
                    }
                    added.push(topic.to_owned());
                }
            }
        }

        tracing::debug!(
            subscriber = %self.shared.id,
            topics = ?added,
            replays = replays.len(),
            "Subscribed"
        );

        for replay in replays {
            dispatch_async(Arc::clone(&self.shared), Arc::new(replay));
        }
    }

    /// Unsubscribe from topics. Topics not currently subscribed are ignored.
    pub fn unsubscribe<I, S>(&self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut own = self.shared.topics.lock();
        let mut registry = self.bus.inner.registry.lock();
        for topic in topics {
            let topic = topic.as_ref();
            if own.remove(topic) {
                registry.unbind(topic, self.shared.id);
                tracing::debug!(subscriber = %self.shared.id, topic, "Unsubscribed");
            }
        }
    }

    /// Unsubscribe from every topic. Safe to call repeatedly.
    pub fn unsubscribe_all(&self) {
        let mut own = self.shared.topics.lock();
        if own.is_empty() {
            return;
        }
        let mut registry = self.bus.inner.registry.lock();
        let count = own.len();
        for topic in own.drain() {
            registry.unbind(&topic, self.shared.id);
        }
        tracing::debug!(subscriber = %self.shared.id, count, "Unsubscribed from all topics");
    }

    /// Snapshot of the subscribed topics, in no particular order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.topics.lock().iter().cloned().collect()
    }

    /// Number of subscribed topics.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.topics.lock().len()
    }

    /// Whether `topic` is currently subscribed (exact match).
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.shared.topics.lock().contains(topic)
    }

    /// Unsubscribe from everything and release the handle.
    pub fn close(self) {
        self.unsubscribe_all();
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.shared.id)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}
