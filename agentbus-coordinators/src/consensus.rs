//! The consensus coordination pattern.

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

/// All agents execute on the input in parallel; the first successful output
/// by iteration order wins.
///
/// `threshold` and `enable_voting` are carried for configuration
/// compatibility but are not binding: the source's consensus coordinator
/// simplifies to "return the first successful output", and implementing a
/// real voting algorithm is left as a documented open question rather than
/// guessed at here.
#[derive(Debug)]
pub struct ConsensusCoordinator {
    pub threshold: f64,
    pub enable_voting: bool,
    hub: Option<Arc<MessageHub>>,
}

impl ConsensusCoordinator {
    #[must_use]
    pub fn new(threshold: f64, enable_voting: bool) -> Self {
        Self { threshold, enable_voting, hub: None }
    }

    #[must_use]
    pub fn with_hub(threshold: f64, enable_voting: bool, hub: Arc<MessageHub>) -> Self {
        Self { threshold, enable_voting, hub: Some(hub) }
    }
}

#[async_trait]
impl Coordinator for ConsensusCoordinator {
    async fn coordinate(
        &self,
        agents: &[Arc<dyn Agent>],
        input: AgentInput,
        cancel: CancellationToken,
    ) -> Result<AgentOutput> {
        if agents.is_empty() {
            return Err(CoordinatorError::InvalidInput("consensus requires at least one agent".into()));
        }
        check_cancelled(&cancel)?;

        tracing::debug!(
            agents = agents.len(),
            threshold = self.threshold,
            enable_voting = self.enable_voting,
            hub_wired = self.hub.is_some(),
            "consensus coordination starting"
        );

        let futures = agents.iter().map(|agent| {
            let input = input.clone();
            async move { (agent.id().to_string(), agent.execute(input).await) }
        });
        let results = join_all(futures).await;

        for (agent_id, result) in results {
            match result {
                Ok(mut out) => {
                    out.trace_id = input.trace_id;
                    return Ok(out);
                }
                Err(err) => tracing::warn!(agent_id, error = %err, "consensus candidate failed"),
            }
        }

        Err(CoordinatorError::AllFailed(agents.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbus_common::mock::MockAgent;

    #[tokio::test]
    async fn returns_first_successful_output() {
        let a: Arc<dyn Agent> = Arc::new(MockAgent::new("a", ["agreed"]));
        let b: Arc<dyn Agent> = Arc::new(MockAgent::new("b", ["also agreed"]));
        let coordinator = ConsensusCoordinator::new(0.5, false);

        let out = coordinator.coordinate(&[a, b], AgentInput::new("q"), CancellationToken::new()).await.unwrap();
        assert_eq!(out.content, "agreed");
    }

    #[tokio::test]
    async fn all_failing_is_an_error() {
        let a: Arc<dyn Agent> = Arc::new(MockAgent::failing("a", "no"));
        let coordinator = ConsensusCoordinator::new(0.5, false);

        let err = coordinator.coordinate(&[a], AgentInput::new("q"), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AllFailed(1)));
    }
}
