//! Agent configuration.

use crate::services::ServiceConfig;
use anyhow::{Context, Result};
use std::time::Duration;
use topicbus_core::BusConfig;
use uuid::Uuid;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent unique identifier
    pub agent_id: Option<Uuid>,

    /// Bus configuration
    pub bus: BusConfig,

    /// Status heartbeat configuration
    pub status: StatusConfig,

    /// Responder services to host
    pub services: Vec<ServiceConfig>,
}

/// Status heartbeat configuration.
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// Topic the persisted status is published to
    pub topic: String,

    /// Heartbeat interval
    pub interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            bus: BusConfig::default().with_default_call_timeout(Duration::from_secs(1)),
            status: StatusConfig {
                topic: "system.status".to_string(),
                interval: Duration::from_secs(5),
            },
            services: vec![ServiceConfig::echo("svc.echo")],
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TOPICBUS_AGENT_ID`: Agent UUID
    /// - `TOPICBUS_REPLY_NAMESPACE`: Namespace for call reply topics
    /// - `TOPICBUS_CALL_TIMEOUT_MS`: Default call deadline (0 waits forever)
    /// - `TOPICBUS_STATUS_TOPIC`: Topic for the persisted status heartbeat
    /// - `TOPICBUS_STATUS_INTERVAL_MS`: Heartbeat interval
    /// - `TOPICBUS_SERVICES`: JSON array of `{"topic": ..., "kind": "echo"|"upper"|"count"}`
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(id) = var("TOPICBUS_AGENT_ID") {
            config.agent_id = Some(Uuid::parse_str(&id).context("Invalid TOPICBUS_AGENT_ID")?);
        }

        if let Some(namespace) = var("TOPICBUS_REPLY_NAMESPACE") {
            config.bus.reply_namespace = namespace;
        }

        if let Some(ms) = var("TOPICBUS_CALL_TIMEOUT_MS") {
            let ms: u64 = ms.parse().context("Invalid TOPICBUS_CALL_TIMEOUT_MS")?;
            config.bus.default_call_timeout_ms = (ms > 0).then_some(ms);
        }

        if let Some(topic) = var("TOPICBUS_STATUS_TOPIC") {
            config.status.topic = topic;
        }

        if let Some(ms) = var("TOPICBUS_STATUS_INTERVAL_MS") {
            let ms: u64 = ms.parse().context("Invalid TOPICBUS_STATUS_INTERVAL_MS")?;
            anyhow::ensure!(ms > 0, "TOPICBUS_STATUS_INTERVAL_MS must be positive");
            config.status.interval = Duration::from_millis(ms);
        }

        // Parse services from JSON env var
        if let Some(services_json) = var("TOPICBUS_SERVICES") {
            config.services =
                serde_json::from_str(&services_json).context("Invalid TOPICBUS_SERVICES JSON")?;
        }

        Ok(config)
    }
}
