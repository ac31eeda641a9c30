//! Bus configuration.

use crate::topic::REPLY_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Namespace under which call reply topics are generated (default: `"$ret"`)
    pub reply_namespace: String,

    /// Deadline used by [`Bus::call_default`](crate::Bus::call_default), in
    /// milliseconds. `None` waits indefinitely.
    pub default_call_timeout_ms: Option<u64>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            reply_namespace: REPLY_NAMESPACE.to_string(),
            default_call_timeout_ms: None,
        }
    }
}

impl BusConfig {
    /// Use a different reply namespace.
    #[must_use]
    pub fn with_reply_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.reply_namespace = namespace.into();
        self
    }

    /// Set the default call deadline.
    #[must_use]
    pub fn with_default_call_timeout(mut self, timeout: Duration) -> Self {
        self.default_call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Default call deadline, if any.
    #[must_use]
    pub fn default_call_timeout(&self) -> Option<Duration> {
        self.default_call_timeout_ms.map(Duration::from_millis)
    }
}
