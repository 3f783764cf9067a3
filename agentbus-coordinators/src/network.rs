//! The network coordination pattern.

use std::sync::Arc;

use agentbus_common::agent::{Agent, AgentInput, AgentOutput};
use agentbus_hub::MessageHub;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{broadcast::BroadcastCoordinator, coordinator::Coordinator, error::Result};

/// A placeholder for free-form agent-to-agent messaging through the hub.
///
/// The minimum observed contract — per the design notes — is identical to
/// [`BroadcastCoordinator`]: every agent executes in parallel and the
/// survivors are concatenated. The name implies graph-topology messaging
/// (agents addressing each other directly rather than fanning out from one
/// caller); that richer behaviour is left for a future implementation to
/// build on top of the hub this coordinator already carries a reference to.
#[derive(Debug)]
pub struct NetworkCoordinator {
    inner: BroadcastCoordinator,
    hub: Option<Arc<MessageHub>>,
}

impl NetworkCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: BroadcastCoordinator::new(), hub: None }
    }

    #[must_use]
    pub fn with_hub(hub: Arc<MessageHub>) -> Self {
        Self { inner: BroadcastCoordinator::with_hub(hub.clone()), hub: Some(hub) }
    }
}

impl Default for NetworkCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Coordinator for NetworkCoordinator {
    async fn coordinate(
        &self,
        agents: &[Arc<dyn Agent>],
        input: AgentInput,
        cancel: CancellationToken,
    ) -> Result<AgentOutput> {
        tracing::debug!(agents = agents.len(), hub_wired = self.hub.is_some(), "network coordination starting");
        self.inner.coordinate(agents, input, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbus_common::mock::MockAgent;

    #[tokio::test]
    async fn behaves_like_broadcast() {
        let a: Arc<dyn Agent> = Arc::new(MockAgent::new("a", ["opinion A"]));
        let b: Arc<dyn Agent> = Arc::new(MockAgent::new("b", ["opinion B"]));
        let coordinator = NetworkCoordinator::new();

        let out = coordinator.coordinate(&[a, b], AgentInput::new("topic"), CancellationToken::new()).await.unwrap();
        assert!(out.content.contains("opinion A"));
        assert!(out.content.contains("opinion B"));
    }
}
