//! The broadcast coordination pattern.

use std::sync::Arc;

use agentbus_common::agent::{Agent, AgentInput, AgentOutput};
use agentbus_hub::MessageHub;
use async_trait::async_trait;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::{
    coordinator::{check_cancelled, Coordinator},
    error::{CoordinatorError, Result},
};

/// Fans `agent.execute(input)` out to every agent in parallel, discards
/// failures (logged at warn), and concatenates the survivors labelled
/// `Agent i:` in iteration order. Fails only if every agent failed.
#[derive(Debug, Default)]
pub struct BroadcastCoordinator {
    hub: Option<Arc<MessageHub>>,
}

impl BroadcastCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self { hub: None }
    }

    #[must_use]
    pub fn with_hub(hub: Arc<MessageHub>) -> Self {
        Self { hub: Some(hub) }
    }
}

#[async_trait]
impl Coordinator for BroadcastCoordinator {
    async fn coordinate(
        &self,
        agents: &[Arc<dyn Agent>],
        input: AgentInput,
        cancel: CancellationToken,
    ) -> Result<AgentOutput> {
        if agents.is_empty() {
            return Err(CoordinatorError::InvalidInput("broadcast requires at least one agent".into()));
        }
        check_cancelled(&cancel)?;

        tracing::debug!(agents = agents.len(), hub_wired = self.hub.is_some(), "broadcast coordination starting");

        let futures = agents.iter().map(|agent| {
            let input = input.clone();
            async move { (agent.id().to_string(), agent.execute(input).await) }
        });
        let results = join_all(futures).await;

        let mut parts = Vec::with_capacity(results.len());
        for (idx, (agent_id, result)) in results.into_iter().enumerate() {
            match result {
                Ok(out) => parts.push(format!("Agent {}: {}", idx + 1, out.content)),
                Err(err) => tracing::warn!(agent_id, error = %err, "broadcast agent failed"),
            }
        }

        if parts.is_empty() {
            return Err(CoordinatorError::AllFailed(agents.len()));
        }

        let mut output = AgentOutput::new(parts.join("\n"));
        output.trace_id = input.trace_id;
        Ok(output)
    }
}
