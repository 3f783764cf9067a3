//! The debate coordination pattern.

use std::sync::Arc;

use agentbus_common::agent::{Agent, AgentInput, AgentOutput};
use agentbus_hub::MessageHub;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    coordinator::{check_cancelled, Coordinator},
    error::{CoordinatorError, Result},
};

/// Round 0: every agent proposes once on the original input. Rounds
/// `1..=max_rounds`: every agent is shown the original question plus every
/// *other* agent's latest proposal and produces a revision.
///
/// The winner is the first surviving proposal by iteration order —
/// unspecified but stable, per the design notes: a real voting or
/// similarity-convergence rule is left to a future consensus algorithm, not
/// reinvented here.
#[derive(Debug)]
pub struct DebateCoordinator {
    max_rounds: usize,
    hub: Option<Arc<MessageHub>>,
}

impl DebateCoordinator {
    #[must_use]
    pub fn new(max_rounds: usize) -> Self {
        Self { max_rounds, hub: None }
    }

    #[must_use]
    pub fn with_hub(max_rounds: usize, hub: Arc<MessageHub>) -> Self {
        Self { max_rounds, hub: Some(hub) }
    }

    fn revision_prompt(original: &str, proposals: &[AgentOutput], exclude: usize) -> String {
        let others: String = proposals
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != exclude)
            .map(|(i, p)| format!("Agent {}: {}", i + 1, p.content))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Original question: {original}\n\nOther proposals:\n{others}\n\nRevise your proposal.")
    }
}

#[async_trait]
impl Coordinator for DebateCoordinator {
    async fn coordinate(
        &self,
        agents: &[Arc<dyn Agent>],
        input: AgentInput,
        cancel: CancellationToken,
    ) -> Result<AgentOutput> {
        if agents.is_empty() {
            return Err(CoordinatorError::InvalidInput("debate requires at least one agent".into()));
        }
        check_cancelled(&cancel)?;

        tracing::debug!(
            agents = agents.len(),
            max_rounds = self.max_rounds,
            hub_wired = self.hub.is_some(),
            "debate coordination starting"
        );

        let original = input.content.clone();
        let mut proposals = Vec::with_capacity(agents.len());
        for agent in agents {
            check_cancelled(&cancel)?;
            let out = agent.execute(input.clone()).await.map_err(|source| CoordinatorError::AgentFailure {
                agent_id: agent.id().to_string(),
                source,
            })?;
            proposals.push(out);
        }

        for round in 1..=self.max_rounds {
            check_cancelled(&cancel)?;
            tracing::debug!(round, "debate round starting");
            let mut next_round = Vec::with_capacity(agents.len());
            for (idx, agent) in agents.iter().enumerate() {
                check_cancelled(&cancel)?;
                let prompt = Self::revision_prompt(&original, &proposals, idx);
                let revision = AgentInput {
                    content: prompt,
                    payload: input.payload.clone(),
                    trace_id: input.trace_id.clone(),
                };
                let out = agent.execute(revision).await.map_err(|source| CoordinatorError::AgentFailure {
                    agent_id: agent.id().to_string(),
                    source,
                })?;
                next_round.push(out);
            }
            proposals = next_round;
        }

        let mut winner = proposals.into_iter().next().expect("agents is non-empty, checked above");
        winner.trace_id = input.trace_id;
        Ok(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbus_common::mock::MockAgent;

    #[tokio::test]
    async fn every_agent_runs_at_least_twice_with_one_round() {
        let a = Arc::new(MockAgent::new("a", ["opinion A", "revised A"]));
        let b = Arc::new(MockAgent::new("b", ["opinion B", "revised B"]));
        let coordinator = DebateCoordinator::new(1);

        let out = coordinator
            .coordinate(
                &[a.clone() as Arc<dyn Agent>, b.clone() as Arc<dyn Agent>],
                AgentInput::new("What is best?"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!out.content.is_empty());
        assert!(a.call_count() >= 2);
        assert!(b.call_count() >= 2);
    }

    #[tokio::test]
    async fn zero_rounds_returns_the_first_proposal() {
        let a: Arc<dyn Agent> = Arc::new(MockAgent::new("a", ["only proposal"]));
        let coordinator = DebateCoordinator::new(0);

        let out = coordinator.coordinate(&[a], AgentInput::new("q"), CancellationToken::new()).await.unwrap();
        assert_eq!(out.content, "only proposal");
    }

    #[tokio::test]
    async fn an_agent_erroring_mid_round_surfaces_as_agent_failure() {
        let a: Arc<dyn Agent> = Arc::new(MockAgent::failing("a", "disagreement overflow"));
        let coordinator = DebateCoordinator::new(1);

        let err = coordinator.coordinate(&[a], AgentInput::new("q"), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AgentFailure { .. }));
    }
}
