//! Messages and publish flags.

use serde::{Deserialize, Serialize};

/// Opaque application data carried by a message.
///
/// `Payload::Null` is the empty payload.
pub type Payload = serde_json::Value;

/// A message addressed to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Topic the message is addressed to (e.g. `"system.status"`)
    pub target: String,
    /// Topic the sender expects answers on; empty when no reply is expected
    #[serde(default)]
    pub reply_to: String,
    /// Message payload
    #[serde(default)]
    pub payload: Payload,
    /// Set only on cached messages replayed to a new subscriber
    #[serde(default)]
    pub is_replay: bool,
}

impl Message {
    /// Create a message with no reply topic.
    #[must_use]
    pub fn new(target: impl Into<String>, payload: Payload) -> Self {
        Self {
            target: target.into(),
            reply_to: String::new(),
            payload,
            is_replay: false,
        }
    }

    /// Set the topic answers should be published to.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = reply_to.into();
        self
    }

    /// Whether the sender is waiting for an answer.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        !self.reply_to.is_empty()
    }

    /// Copy of this message flagged as a replay from the last-message cache.
    #[must_use]
    pub(crate) fn as_replay(&self) -> Self {
        Self {
            is_replay: true,
            ..self.clone()
        }
    }
}

/// Optional publish flags. All default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishOptions {
    /// Cache the message so future subscribers to the target receive it
    pub persist: bool,
    /// Deliver only to the exact target, not to its ancestors
    pub no_propagate: bool,
    /// Run callbacks on the publisher's thread instead of spawning a task each
    pub synchronous: bool,
}

impl PublishOptions {
    /// Enable `persist`.
    #[must_use]
    pub fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Enable `no_propagate`.
    #[must_use]
    pub fn no_propagate(mut self) -> Self {
        self.no_propagate = true;
        self
    }

    /// Enable `synchronous`.
    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_expects_no_reply() {
        let msg = Message::new("cartas.sota", json!(1));

        assert_eq!(msg.target, "cartas.sota");
        assert!(msg.reply_to.is_empty());
        assert!(!msg.expects_reply());
        assert!(!msg.is_replay);
    }

    #[test]
    fn replay_copy_keeps_contents() {
        let msg = Message::new("cartas.sota", json!({"n": 1})).with_reply_to("$ret.9");
        let replay = msg.as_replay();

        assert!(replay.is_replay);
        assert!(!msg.is_replay);
        assert_eq!(replay.target, msg.target);
        assert_eq!(replay.reply_to, "$ret.9");
        assert_eq!(replay.payload, msg.payload);
    }

    #[test]
    fn options_builders() {
        let opts = PublishOptions::default().persisted().synchronous();

        assert!(opts.persist);
        assert!(opts.synchronous);
        assert!(!opts.no_propagate);
        assert_eq!(PublishOptions::default(), PublishOptions {
            persist: false,
            no_propagate: false,
            synchronous: false,
        });
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: PublishOptions = serde_json::from_str(r#"{"no_propagate": true}"#).unwrap();

        assert!(opts.no_propagate);
        assert!(!opts.persist);
        assert!(!opts.synchronous);
    }

    #[test]
    fn message_json_shape() {
        let msg: Message = serde_json::from_str(r#"{"target": "root.f1", "payload": "Hello"}"#).unwrap();

        assert_eq!(msg.target, "root.f1");
        assert_eq!(msg.payload, json!("Hello"));
        assert!(!msg.expects_reply());
    }
}
