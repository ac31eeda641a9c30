//! Subscription index and last-message cache.
//!
//! The registry is plain data; the bus wraps it in a single mutex and every
//! lookup or mutation happens while holding it.

use crate::message::Message;
use crate::subscriber::{SubscriberId, SubscriberShared};
use crate::topic::ancestors;
use std::collections::HashMap;
use std::sync::Arc;

type Bound = HashMap<SubscriberId, Arc<SubscriberShared>>;

#[derive(Default)]
pub(crate) struct Registry {
    /// Topic → subscribers bound to exactly that topic. Never holds empty sets.
    subscriptions: HashMap<String, Bound>,
    /// Topic → last persisted message, already flagged as a replay
    last_message: HashMap<String, Message>,
}

impl Registry {
    pub(crate) fn bind(&mut self, topic: &str, subscriber: &Arc<SubscriberShared>) {
        self.subscriptions
            .entry(topic.to_owned())
            .or_default()
            .insert(subscriber.id(), Arc::clone(subscriber));
    }

    /// Remove a binding, dropping the topic entry once nobody is left on it.
    pub(crate) fn unbind(&mut self, topic: &str, id: SubscriberId) -> bool {
        let Some(bound) = self.subscriptions.get_mut(topic) else {
            return false;
        };
        let removed = bound.remove(&id).is_some();
        if bound.is_empty() {
            self.subscriptions.remove(topic);
        }
        removed
    }

    pub(crate) fn persist(&mut self, msg: &Message) {
        self.last_message
            .insert(msg.target.clone(), msg.as_replay());
    }

    pub(crate) fn persisted(&self, topic: &str) -> Option<Message> {
        self.last_message.get(topic).cloned()
    }

    /// Snapshot the subscribers of `target` and, unless `no_propagate`, of
    /// every ancestor. One entry per (level, subscriber) pair.
    pub(crate) fn resolve(&self, target: &str, no_propagate: bool) -> Vec<Arc<SubscriberShared>> {
        let depth = if no_propagate { 1 } else { usize::MAX };
        ancestors(target)
            .take(depth)
            .filter_map(|level| self.subscriptions.get(level))
            .flat_map(|bound| bound.values().cloned())
            .collect()
    }

    pub(crate) fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions.get(topic).map_or(0, HashMap::len)
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.subscriptions.len()
    }
}
