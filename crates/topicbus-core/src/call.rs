//! Call/answer protocol.
//!
//! A call publishes a request whose `reply_to` is a fresh topic under the
//! bus reply namespace (`"$ret.17"`), waits on a transient subscription to
//! that topic, and tears the subscription down on every exit path. The
//! transient subscriber is dropped even when the call future itself is
//! dropped mid-wait.
//!
//! ```text
//! caller --(target, reply_to=$ret.n)--> responder
//! caller <--($ret.n, no_propagate)----- responder
//! ```

use crate::bus::Bus;
use crate::error::CallError;
use crate::message::{Message, Payload, PublishOptions};
use parking_lot::Mutex;
use std::future::{pending, Future};
use std::time::Duration;
use tokio::sync::oneshot;

impl Bus {
    /// Publish `payload` to `topic` and wait for a single answer.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if `cancel` completes first.
    pub async fn call<F>(&self, topic: &str, payload: Payload, cancel: F) -> Result<Payload, CallError>
    where
        F: Future<Output = ()>,
    {
        self.call_with(topic, payload, PublishOptions::default(), cancel)
            .await
    }

    /// Like [`Bus::call`], publishing the request with `options`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if `cancel` completes first.
    pub async fn call_with<F>(
        &self,
        topic: &str,
        payload: Payload,
        options: PublishOptions,
        cancel: F,
    ) -> Result<Payload, CallError>
    where
        F: Future<Output = ()>,
    {
        let reply_to = self.inner.replies.next_topic();
        let (tx, rx) = oneshot::channel::<Message>();
        let slot = Mutex::new(Some(tx));

        // First answer wins; later ones find the slot empty.
        let pending_reply = self.subscriber(move |msg| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(msg.clone());
            }
        });
        pending_reply.subscribe([reply_to.as_str()]);

        let request = Message::new(topic, payload).with_reply_to(reply_to.as_str());
        let dispatched = self.publish(&request, options);
        tracing::debug!(topic, reply_to, dispatched, "Call sent");

        let outcome = tokio::select! {
            biased;
            answer = rx => answer.map(|msg| msg.payload).map_err(|_| CallError::Cancelled),
            () = cancel => Err(CallError::Cancelled),
        };

        pending_reply.close();

        if let Err(err) = &outcome {
            tracing::debug!(topic, reply_to, error = %err, "Call ended without answer");
        }
        outcome
    }

    /// Call with a deadline. `Duration::ZERO` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::TimedOut`] if no answer arrives within `timeout`.
    pub async fn call_timeout(
        &self,
        topic: &str,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload, CallError> {
        if timeout.is_zero() {
            return self.call(topic, payload, pending()).await;
        }
        tokio::time::timeout(timeout, self.call(topic, payload, pending()))
            .await
            .unwrap_or(Err(CallError::TimedOut(timeout)))
    }

    /// Call using the deadline from [`BusConfig`](crate::BusConfig).
    ///
    /// # Errors
    ///
    /// Returns [`CallError::TimedOut`] if the configured deadline elapses.
    pub async fn call_default(&self, topic: &str, payload: Payload) -> Result<Payload, CallError> {
        let timeout = self.inner.config.default_call_timeout().unwrap_or(Duration::ZERO);
        self.call_timeout(topic, payload, timeout).await
    }

    /// Answer `msg` with `payload`.
    ///
    /// The answer goes only to the exact `reply_to` topic. Messages without a
    /// reply topic are ignored. Returns the number of dispatches, which is 0
    /// when the caller has already gone away.
    pub fn answer(&self, msg: &Message, payload: Payload) -> usize {
        if !msg.expects_reply() {
            tracing::trace!(topic = %msg.target, "Answer ignored, no reply topic");
            return 0;
        }
        self.publish(
            &Message::new(msg.reply_to.as_str(), payload),
            PublishOptions::default().no_propagate(),
        )
    }
}

impl Message {
    /// Answer this message on `bus`. See [`Bus::answer`].
    pub fn answer(&self, bus: &Bus, payload: Payload) -> usize {
        bus.answer(self, payload)
    }
}
