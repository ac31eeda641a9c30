//! Propagation engine.
//!
//! A message published to `"a.b.c"` is delivered to subscribers of `"a.b.c"`,
//! then `"a.b"`, then `"a"`. Delivery never flows down to descendants.
//!
//! Recipients are snapshotted under the registry lock; callbacks run after the
//! lock is released, so a callback may publish, subscribe or unsubscribe
//! freely.

use crate::config::BusConfig;
use crate::message::{Message, Payload, PublishOptions};
use crate::registry::Registry;
use crate::subscriber::{Subscriber, SubscriberShared};
use crate::topic::{ancestors, ReplyTopics};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Where an asynchronous delivery runs.
///
/// Resolved per dispatch, so a bus outlives any runtime it was created in.
#[derive(Debug)]
enum Executor {
    /// Blocking pool of the caller's Tokio runtime; callbacks are synchronous and may block.
    Runtime(Handle),
    /// A dedicated OS thread, for publishes made outside a runtime.
    Threads,
}

impl Executor {
    fn current() -> Self {
        Handle::try_current().map_or(Self::Threads, Self::Runtime)
    }

    /// Hand `job` off. Returns false if it could not be scheduled.
    fn spawn<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Self::Runtime(handle) => {
                drop(handle.spawn_blocking(job));
                true
            }
            Self::Threads => match std::thread::Builder::new()
                .name("topicbus-delivery".to_string())
                .spawn(job)
            {
                Ok(_) => true,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to spawn delivery thread");
                    false
                }
            },
        }
    }
}

pub(crate) struct BusInner {
    pub(crate) registry: Mutex<Registry>,
    pub(crate) replies: ReplyTopics,
    pub(crate) config: BusConfig,
}

/// Hierarchical publish/subscribe bus.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone)]
pub struct Bus {
    pub(crate) inner: Arc<BusInner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Create a bus with default configuration.
    ///
    /// Asynchronous deliveries run on the publisher's Tokio runtime if there
    /// is one, otherwise on dedicated threads.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with the given configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        tracing::debug!(reply_namespace = %config.reply_namespace, "Bus created");
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                replies: ReplyTopics::new(config.reply_namespace.clone()),
                config,
            }),
        }
    }

    /// Configuration this bus was created with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Create a subscriber that invokes `callback` for every delivered message.
    ///
    /// The subscriber starts with no topics.
    pub fn subscriber<F>(&self, callback: F) -> Subscriber
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Subscriber::new(self.clone(), callback)
    }

    /// Publish a message to its target and, unless `no_propagate` is set, to
    /// every ancestor of the target.
    ///
    /// Returns the number of dispatches handed off. A subscriber bound at two
    /// matching levels is counted twice. Zero subscribers is not an error.
    pub fn publish(&self, msg: &Message, options: PublishOptions) -> usize {
        let recipients = {
            let mut registry = self.inner.registry.lock();
            if options.persist {
                registry.persist(msg);
            }
            registry.resolve(&msg.target, options.no_propagate)
        };

        let levels = if options.no_propagate {
            1
        } else {
            ancestors(&msg.target).count()
        };

        let dispatched = if options.synchronous {
            for subscriber in &recipients {
                subscriber.deliver(msg);
            }
            recipients.len()
        } else {
            let shared = Arc::new(msg.clone());
            recipients
                .into_iter()
                .filter(|subscriber| dispatch_async(Arc::clone(subscriber), Arc::clone(&shared)))
                .count()
        };

        tracing::trace!(
            topic = %msg.target,
            reply_to = %msg.reply_to,
            persist = options.persist,
            no_propagate = options.no_propagate,
            synchronous = options.synchronous,
            levels,
            dispatched,
            "Published message"
        );
        dispatched
    }

    /// Build a message with no reply topic and publish it.
    pub fn publish_to(
        &self,
        topic: impl Into<String>,
        payload: Payload,
        options: PublishOptions,
    ) -> usize {
        self.publish(&Message::new(topic, payload), options)
    }

    /// Number of subscribers bound to exactly `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.registry.lock().subscriber_count(topic)
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.registry.lock().topic_count()
    }

    /// The cached message that new subscribers to `topic` would replay.
    #[must_use]
    pub fn persisted(&self, topic: &str) -> Option<Message> {
        self.inner.registry.lock().persisted(topic)
    }
}

/// Deliver `msg` to `subscriber` off the calling thread.
///
/// Returns false if the delivery could not be scheduled.
pub(crate) fn dispatch_async(subscriber: Arc<SubscriberShared>, msg: Arc<Message>) -> bool {
    Executor::current().spawn(move || subscriber.deliver(&msg))
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("config", &self.inner.config)
            .field("topics", &self.topic_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(bus: &Bus) -> (Subscriber, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscriber(move |msg| sink.lock().push(msg.clone()));
        (sub, seen)
    }

    fn sync() -> PublishOptions {
        PublishOptions::default().synchronous()
    }

    #[test]
    fn propagates_to_ancestors() {
        let bus = Bus::new();
        let (caballo, caballo_seen) = recorder(&bus);
        let (cartas, cartas_seen) = recorder(&bus);
        caballo.subscribe(["cartas.caballo"]);
        cartas.subscribe(["cartas"]);

        let n = bus.publish_to("cartas.caballo", json!(1), sync());

        assert_eq!(n, 2);
        assert_eq!(caballo_seen.lock().len(), 1);
        assert_eq!(cartas_seen.lock().len(), 1);
        assert_eq!(cartas_seen.lock()[0].target, "cartas.caballo");
    }

    #[test]
    fn no_sibling_leakage() {
        let bus = Bus::new();
        let (caballo, caballo_seen) = recorder(&bus);
        let (cartas, cartas_seen) = recorder(&bus);
        caballo.subscribe(["cartas.caballo"]);
        cartas.subscribe(["cartas"]);

        let n = bus.publish_to("cartas.rey", json!(1), sync());

        assert_eq!(n, 1);
        assert!(caballo_seen.lock().is_empty());
        assert_eq!(cartas_seen.lock()[0].target, "cartas.rey");
    }

    #[test]
    fn no_propagate_stops_at_target() {
        let bus = Bus::new();
        let (caballo, caballo_seen) = recorder(&bus);
        let (cartas, cartas_seen) = recorder(&bus);
        caballo.subscribe(["cartas.caballo"]);
        cartas.subscribe(["cartas"]);

        let n = bus.publish_to("cartas.caballo", json!(2), sync().no_propagate());

        assert_eq!(n, 1);
        assert_eq!(caballo_seen.lock()[0].payload, json!(2));
        assert!(cartas_seen.lock().is_empty());
    }

    #[test]
    fn never_delivers_to_descendants() {
        let bus = Bus::new();
        let (child, child_seen) = recorder(&bus);
        child.subscribe(["a.b.c"]);

        assert_eq!(bus.publish_to("a.b", json!(null), sync()), 0);
        assert!(child_seen.lock().is_empty());
    }

    #[test]
    fn counts_every_matching_level() {
        let bus = Bus::new();
        let (sub, seen) = recorder(&bus);
        sub.subscribe(["x", "x.y"]);

        assert_eq!(bus.publish_to("x.y.z", json!("hi"), sync()), 2);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn publish_without_subscribers() {
        let bus = Bus::new();
        assert_eq!(bus.publish_to("nobody.home", json!(1), PublishOptions::default()), 0);
        assert_eq!(bus.topic_count(), 0);
    }

    #[test]
    fn persisted_copy_is_flagged_but_live_delivery_is_not() {
        let bus = Bus::new();
        let (sub, seen) = recorder(&bus);
        sub.subscribe(["cartas.sota"]);

        bus.publish_to("cartas.sota", json!(1), sync().persisted());

        assert!(!seen.lock()[0].is_replay);
        let cached = bus.persisted("cartas.sota").unwrap();
        assert!(cached.is_replay);
        assert_eq!(cached.payload, json!(1));
    }

    #[test]
    fn persist_is_recorded_without_subscribers() {
        let bus = Bus::new();
        bus.publish_to("late.topic", json!("v"), PublishOptions::default().persisted());

        assert_eq!(bus.persisted("late.topic").unwrap().payload, json!("v"));
        assert!(bus.persisted("late").is_none());
    }

    #[test]
    fn reentrant_callback_does_not_deadlock() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let (echo, echo_seen) = recorder(&bus);
        echo.subscribe(["out"]);

        let handle = bus.clone();
        let counter = Arc::clone(&hits);
        let relay = bus.subscriber(move |msg| {
            counter.fetch_add(1, Ordering::SeqCst);
            handle.publish_to("out", msg.payload.clone(), sync());
            let probe = handle.subscriber(|_| {});
            probe.subscribe(["in.probe"]);
        });
        relay.subscribe(["in"]);

        bus.publish_to("in", json!(7), sync());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(echo_seen.lock()[0].payload, json!(7));
        assert_eq!(bus.subscriber_count("in.probe"), 0);
    }

    #[tokio::test]
    async fn async_dispatch_reaches_subscriber() {
        let bus = Bus::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sub = bus.subscriber(move |msg| {
            let _ = tx.send(msg.clone());
        });
        sub.subscribe(["async.topic"]);

        assert_eq!(bus.publish_to("async.topic.leaf", json!(3), PublishOptions::default()), 1);

        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("no message");
        assert_eq!(msg.target, "async.topic.leaf");
        assert_eq!(msg.payload, json!(3));
    }

    #[test]
    fn async_dispatch_without_runtime_uses_threads() {
        let bus = Bus::new();
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        let sub = bus.subscriber(move |msg| {
            let _ = tx.lock().send(msg.payload.clone());
        });
        sub.subscribe(["threaded"]);

        bus.publish_to("threaded", json!("t"), PublishOptions::default());

        let payload = rx
            .recv_timeout(std::time::Duration::from_secs(1))
            .expect("no delivery");
        assert_eq!(payload, json!("t"));
    }

    #[test]
    fn async_dispatch_counts_handed_off_deliveries() {
        let bus = Bus::new();
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        let sub = bus.subscriber(move |msg| {
            let _ = tx.lock().send(msg.target.clone());
        });
        sub.subscribe(["count", "count.me"]);

        assert_eq!(bus.publish_to("count.me", json!(null), PublishOptions::default()), 2);
        for _ in 0..2 {
            let target = rx
                .recv_timeout(std::time::Duration::from_secs(1))
                .expect("handed-off delivery never ran");
            assert_eq!(target, "count.me");
        }
    }

    #[test]
    fn bus_outlives_runtime_it_was_created_in() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let bus = rt.block_on(async { Bus::new() });
        drop(rt);

        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        let sub = bus.subscriber(move |msg| {
            let _ = tx.lock().send(msg.payload.clone());
        });
        sub.subscribe(["after.shutdown"]);

        assert_eq!(
            bus.publish_to("after.shutdown", json!(1), PublishOptions::default()),
            1
        );
        let payload = rx
            .recv_timeout(std::time::Duration::from_secs(1))
            .expect("callback never ran");
        assert_eq!(payload, json!(1));
    }

    #[test]
    fn config_is_kept() {
        let bus = Bus::with_config(BusConfig::default().with_reply_namespace("_r"));
        assert_eq!(bus.config().reply_namespace, "_r");
    }
}
