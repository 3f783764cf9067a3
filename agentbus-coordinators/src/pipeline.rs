//! The pipeline coordination pattern.

use std::sync::Arc;

use agentbus_common::agent::{Agent, AgentInput, AgentOutput};
use agentbus_hub::MessageHub;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    coordinator::{check_cancelled, Coordinator},
    error::{CoordinatorError, Result},
};

/// Runs agents in a fixed order, feeding each stage's output content as the
/// next stage's input content. A stage that errors aborts the whole run —
/// there is no partial result to fall back to, since every later stage
/// depends on the failed one's output.
///
/// `trace_id` is preserved verbatim from the original input across every
/// stage, so a caller can correlate the whole run from any one stage.
#[derive(Debug, Default)]
pub struct PipelineCoordinator {
    hub: Option<Arc<MessageHub>>,
}

impl PipelineCoordinator {
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
impl Coordinator for PipelineCoordinator {
    async fn coordinate(
        &self,
        agents: &[Arc<dyn Agent>],
        input: AgentInput,
        cancel: CancellationToken,
    ) -> Result<AgentOutput> {
        if agents.is_empty() {
            return Err(CoordinatorError::InvalidInput("pipeline requires at least one agent".into()));
        }

        tracing::debug!(agents = agents.len(), hub_wired = self.hub.is_some(), "pipeline coordination starting");

        let trace_id = input.trace_id.clone();
        let mut stage_input = input;
        let mut output = AgentOutput::default();

        for (idx, agent) in agents.iter().enumerate() {
            check_cancelled(&cancel)?;
            let stage = idx + 1;

            tracing::debug!(stage, agent = agent.id(), "pipeline stage starting");
            output = agent
                .execute(stage_input)
                .await
                .map_err(|source| CoordinatorError::StageFailure { stage, source })?;

            stage_input = AgentInput {
                content: output.content.clone(),
                payload: output.payload.clone(),
                trace_id: trace_id.clone(),
            };
        }

        output.trace_id = trace_id;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbus_common::mock::MockAgent;

    fn agents(specs: Vec<Arc<dyn Agent>>) -> Vec<Arc<dyn Agent>> {
        specs
    }

    #[tokio::test]
    async fn output_of_each_stage_feeds_the_next() {
        let a: Arc<dyn Agent> = Arc::new(MockAgent::new("a", ["stage-a-out"]));
        let b: Arc<dyn Agent> = Arc::new(MockAgent::new("b", ["stage-b-out"]));
        let coordinator = PipelineCoordinator::new();

        let out = coordinator
            .coordinate(&agents(vec![a, b]), AgentInput::new("start"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.content, "stage-b-out");
    }

    #[tokio::test]
    async fn stage_failure_aborts_with_stage_index_and_earlier_stages_ran_once() {
        let a = Arc::new(MockAgent::new("a", ["ok"]));
        let b: Arc<dyn Agent> = Arc::new(MockAgent::failing("b", "stage 2 failed"));
        let coordinator = PipelineCoordinator::new();

        let err = coordinator
            .coordinate(
                &agents(vec![a.clone() as Arc<dyn Agent>, b]),
                AgentInput::new("start"),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("pipeline stage 2"), "{err}");
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test]
    async fn trace_id_survives_every_stage() {
        let a: Arc<dyn Agent> = Arc::new(MockAgent::new("a", ["mid"]));
        let b: Arc<dyn Agent> = Arc::new(MockAgent::new("b", ["end"]));
        let coordinator = PipelineCoordinator::new();

        let input = AgentInput::new("start").with_trace_id("trace-123");
        let out = coordinator.coordinate(&agents(vec![a, b]), input, CancellationToken::new()).await.unwrap();
        assert_eq!(out.trace_id.as_deref(), Some("trace-123"));
    }

    #[tokio::test]
    async fn empty_agent_list_is_rejected() {
        let coordinator = PipelineCoordinator::new();
        let err = coordinator
            .coordinate(&[], AgentInput::new("start"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_stage_runs() {
        let a = Arc::new(MockAgent::new("a", ["ok"]));
        let coordinator = PipelineCoordinator::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator
            .coordinate(&[a.clone() as Arc<dyn Agent>], AgentInput::new("start"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Cancelled));
        assert_eq!(a.call_count(), 0);
    }
}
