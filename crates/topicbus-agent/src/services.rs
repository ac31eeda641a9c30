//! Responder services hosted by the agent.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use topicbus_core::{Bus, Subscriber};

/// What a responder does with a request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Answer with the request payload
    Echo,
    /// Upper-case string payloads, echo anything else
    Upper,
    /// Answer with the number of requests served so far
    Count,
}

/// A responder bound to one topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Topic the responder subscribes to
    pub topic: String,
    /// Behavior
    pub kind: ServiceKind,
}

impl ServiceConfig {
    /// Echo responder on `topic`.
    #[must_use]
    pub fn echo(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: ServiceKind::Echo,
        }
    }
}

fn respond(kind: ServiceKind, served: u64, payload: &Value) -> Value {
    match kind {
        ServiceKind::Echo => payload.clone(),
        ServiceKind::Upper => payload
            .as_str()
            .map_or_else(|| payload.clone(), |s| Value::String(s.to_uppercase())),
        ServiceKind::Count => json!(served),
    }
}

/// Subscribe a responder for `service` on `bus`.
///
/// Requests without a reply topic are counted but not answered.
pub fn register(bus: &Bus, service: &ServiceConfig) -> Subscriber {
    let handle = bus.clone();
    let kind = service.kind;
    let served = AtomicU64::new(0);

    let sub = bus.subscriber(move |msg| {
        let n = served.fetch_add(1, Ordering::Relaxed) + 1;
        if !msg.expects_reply() {
            tracing::debug!(topic = %msg.target, ?kind, "Request without reply topic");
            return;
        }
        let answer = respond(kind, n, &msg.payload);
        let dispatched = msg.answer(&handle, answer);
        if dispatched == 0 {
            tracing::debug!(reply_to = %msg.reply_to, "Caller gone before answer");
        }
    });
    sub.subscribe([service.topic.as_str()]);

    tracing::info!(topic = %service.topic, kind = ?service.kind, "Service registered");
    sub
}
