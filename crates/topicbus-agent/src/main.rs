//! # topicbus Agent
//!
//! Host process for an in-process topicbus.
//!
//! ## Architecture
//!
//! The agent wires three components onto one bus:
//! 1. **Services**: Responders answering calls on configured topics
//! 2. **Monitor**: Logs every message seen on the agent's root topics
//! 3. **Heartbeat**: Publishes a persisted status and probes the first service

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod runtime;
mod services;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting topicbus agent");

    // Load configuration
    let config = AgentConfig::from_env()?;

    let agent_id = config.agent_id.unwrap_or_else(Uuid::new_v4);
    tracing::info!(
        %agent_id,
        services = config.services.len(),
        status_topic = %config.status.topic,
        "Agent initialized"
    );

    let agent = Agent::new(config, agent_id);

    // Run agent
    agent.run().await?;

    Ok(())
}
