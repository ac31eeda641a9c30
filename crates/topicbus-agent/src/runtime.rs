//! Agent runtime orchestration.

use crate::config::AgentConfig;
use crate::services;
use anyhow::Result;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Instant;
use topicbus_core::{Bus, PublishOptions, Subscriber};
use uuid::Uuid;

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
    agent_id: Uuid,
    bus: Bus,
}

impl Agent {
    /// Create a new agent with its own bus.
    #[must_use]
    pub fn new(config: AgentConfig, agent_id: Uuid) -> Self {
        let bus = Bus::with_config(config.bus.clone());
        Self {
            config,
            agent_id,
            bus,
        }
    }

    /// The bus shared by every component of this agent.
    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Register every configured responder.
    pub fn start_services(&self) -> Vec<Subscriber> {
        self.config
            .services
            .iter()
            .map(|service| services::register(&self.bus, service))
            .collect()
    }

    /// Subscribe a logger to the root segment of every topic the agent uses.
    pub fn start_monitor(&self) -> Subscriber {
        let roots: BTreeSet<String> = self
            .config
            .services
            .iter()
            .map(|service| service.topic.as_str())
            .chain(std::iter::once(self.config.status.topic.as_str()))
            .filter_map(|topic| topic.split('.').next())
            .map(str::to_string)
            .collect();

        let monitor = self.bus.subscriber(|msg| {
            tracing::debug!(
                topic = %msg.target,
                reply_to = %msg.reply_to,
                replay = msg.is_replay,
                "Observed message"
            );
        });
        monitor.subscribe(&roots);
        tracing::info!(roots = ?roots, "Monitor attached");
        monitor
    }

    /// Publish the persisted status message.
    pub fn publish_status(&self, started: Instant) -> usize {
        let uptime_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = json!({
            "agent_id": self.agent_id,
            "uptime_ms": uptime_ms,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.bus.publish_to(
            self.config.status.topic.as_str(),
            status,
            PublishOptions::default().persisted(),
        )
    }

    /// Call the first configured service and log the round trip.
    pub async fn probe(&self) {
        let Some(service) = self.config.services.first() else {
            return;
        };
        let started = Instant::now();
        match self
            .bus
            .call_default(&service.topic, json!({ "probe": self.agent_id }))
            .await
        {
            Ok(answer) => tracing::debug!(
                topic = %service.topic,
                elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
                %answer,
                "Probe answered"
            ),
            Err(err) => tracing::warn!(
                topic = %service.topic,
                timed_out = err.is_timeout(),
                error = %err,
                "Probe failed"
            ),
        }
    }

    /// Run the agent's main loop until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if the shutdown signal cannot be installed.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            agent_id = %self.agent_id,
            reply_namespace = %self.bus.config().reply_namespace,
            call_timeout = ?self.bus.config().default_call_timeout(),
            "Starting agent runtime"
        );

        let services = self.start_services();
        let monitor = self.start_monitor();
        let started = Instant::now();
        let mut heartbeat = tokio::time::interval(self.config.status.interval);

        tracing::info!("Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let dispatched = self.publish_status(started);
                    tracing::debug!(topic = %self.config.status.topic, dispatched, "Status published");
                    self.probe().await;
                }

                // Handle shutdown
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        for service in services {
            service.close();
        }
        monitor.close();

        tracing::info!(topics = self.bus().topic_count(), "Agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ServiceConfig, ServiceKind};
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    fn agent() -> Agent {
        let config = AgentConfig {
            services: vec![
                ServiceConfig::echo("svc.echo"),
                ServiceConfig {
                    topic: "svc.upper".to_string(),
                    kind: ServiceKind::Upper,
                },
            ],
            ..AgentConfig::default()
        };
        Agent::new(config, Uuid::new_v4())
    }

    #[tokio::test]
    async fn services_answer_calls() {
        let agent = agent();
        let _services = agent.start_services();
        let timeout = Duration::from_secs(1);

        let bus = agent.bus();
        assert_eq!(bus.call_timeout("svc.echo", json!(1), timeout).await, Ok(json!(1)));
        assert_eq!(
            bus.call_timeout("svc.upper", json!("abc"), timeout).await,
            Ok(json!("ABC"))
        );
    }

    #[tokio::test]
    async fn monitor_binds_roots_once() {
        let agent = agent();
        let monitor = agent.start_monitor();

        let mut roots = monitor.subscriptions();
        roots.sort();
        assert_eq!(roots, vec!["svc".to_string(), "system".to_string()]);
    }

    #[tokio::test]
    async fn status_is_replayed_to_late_subscribers() {
        let agent = agent();
        agent.publish_status(Instant::now());

        let (tx, mut rx) = unbounded_channel();
        let watcher = agent.bus().subscriber(move |msg| {
            let _ = tx.send(msg.clone());
        });
        watcher.subscribe(["system.status"]);

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout waiting for status")
            .expect("watcher dropped");
        assert!(msg.is_replay);
        assert_eq!(msg.payload["agent_id"], json!(agent.agent_id));
    }

    #[test]
    fn bus_takes_agent_config() {
        let agent = agent();
        assert_eq!(
            agent.bus().config().default_call_timeout(),
            Some(Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn probe_without_services_is_quiet() {
        let config = AgentConfig {
            services: Vec::new(),
            ..AgentConfig::default()
        };
        let agent = Agent::new(config, Uuid::new_v4());

        agent.probe().await;
        assert_eq!(agent.bus().topic_count(), 0);
    }
}
