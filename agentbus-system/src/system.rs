//! [`MultiAgentSystem`]: the façade a host application drives.

use std::sync::Arc;

use agentbus_common::agent::{Agent, AgentInput, AgentOutput};
use agentbus_coordinators::{CoordinationPattern, Coordinator, PatternConfig};
use agentbus_hub::MessageHub;
use agentbus_message_store::{Message, MessageStore};
use agentbus_retry::RetryPolicy;
use agentbus_tracing::traced;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::MultiAgentSystemConfig,
    error::{Result, SystemError},
};

/// Builds a [`MessageHub`], registers a mailbox per agent, and instantiates
/// the [`Coordinator`] named by `config.pattern` (degrading to debate on an
/// unrecognised name), then exposes one [`Self::execute`] call that drives a
/// single collaboration session.
///
/// Owns its hub and coordinator outright; the agent handles are shared with
/// the caller (back references only), matching this design's ownership rule
/// for a multi-agent system.
pub struct MultiAgentSystem {
    agents: Vec<Arc<dyn Agent>>,
    hub: Arc<MessageHub>,
    coordinator: Box<dyn Coordinator>,
    timeout: std::time::Duration,
    // Kept alive so the hub's registered mailboxes stay open for a pattern
    // (debate, network) that exchanges intermediate messages through them;
    // unused otherwise, since the patterns in this crate drive agents
    // directly via `Agent::execute` rather than routing through the hub.
    _mailboxes: Vec<mpsc::Receiver<Message>>,
}

impl std::fmt::Debug for MultiAgentSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiAgentSystem")
            .field("agents", &self.agents.iter().map(|a| a.id()).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MultiAgentSystem {
    /// Build a system over `agents`, backed by `message_store` for the
    /// hub's durable mailbox persistence.
    ///
    /// # Errors
    /// Returns [`SystemError::NoAgents`] if `agents` is empty, or
    /// [`SystemError::Hub`] if mailbox registration fails.
    pub async fn new(
        agents: Vec<Arc<dyn Agent>>,
        message_store: Arc<dyn MessageStore>,
        config: &MultiAgentSystemConfig,
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(SystemError::NoAgents);
        }

        let hub = Arc::new(MessageHub::new(message_store, RetryPolicy::default()));
        let mut mailboxes = Vec::with_capacity(agents.len());
        for agent in &agents {
            mailboxes.push(hub.register(agent.id()).await?);
        }

        let pattern = CoordinationPattern::parse_or_default(&config.pattern);
        let pattern_config = PatternConfig {
            max_rounds: config.max_rounds,
            consensus_threshold: config.consensus_threshold,
            enable_voting: config.enable_voting,
        };
        let coordinator = pattern.build(&pattern_config, Arc::clone(&hub));

        Ok(Self {
            agents,
            hub,
            coordinator,
            timeout: config.timeout(),
            _mailboxes: mailboxes,
        })
    }

    #[must_use]
    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<MessageHub> {
        &self.hub
    }

    /// Run one collaboration session: drive the configured coordinator over
    /// this system's agents on `input`, bounded by the configured overall
    /// timeout.
    ///
    /// # Errors
    /// Returns [`SystemError::SessionTimeout`] if the session exceeds its
    /// configured timeout, or propagates the coordinator's error otherwise.
    #[traced]
    pub async fn execute(&self, input: AgentInput) -> Result<AgentOutput> {
        let cancel = CancellationToken::new();
        let run = self.coordinator.coordinate(&self.agents, input, cancel.clone());

        match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => {
                cancel.cancel();
                Err(SystemError::SessionTimeout(self.timeout))
            }
        }
    }

    /// Close the underlying hub, releasing its mailboxes and store handle.
    ///
    /// # Errors
    /// Propagates the hub's close error, if any.
    pub async fn shutdown(&self) -> Result<()> {
        Ok(self.hub.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbus_common::mock::MockAgent;
    use agentbus_message_store::backends::MemoryMessageStore;

    fn store() -> Arc<dyn MessageStore> {
        Arc::new(MemoryMessageStore::new(RetryPolicy::default()))
    }

    #[tokio::test]
    async fn empty_agent_list_is_rejected_at_construction() {
        let err = MultiAgentSystem::new(vec![], store(), &MultiAgentSystemConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SystemError::NoAgents));
    }

    #[tokio::test]
    async fn unknown_pattern_degrades_to_debate_and_still_runs() {
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(MockAgent::new("a", ["opinion A"])),
            Arc::new(MockAgent::new("b", ["opinion B"])),
        ];
        let config = MultiAgentSystemConfig { pattern: "not-a-real-pattern".into(), max_rounds: 1, ..Default::default() };
        let system = MultiAgentSystem::new(agents, store(), &config).await.unwrap();

        let out = system.execute(AgentInput::new("What is best?")).await.unwrap();
        assert!(!out.content.is_empty());
    }

    #[tokio::test]
    async fn pipeline_pattern_chains_agent_outputs() {
        let agents: Vec<Arc<dyn Agent>> =
            vec![Arc::new(MockAgent::new("a", ["mid"])), Arc::new(MockAgent::new("b", ["final"]))];
        let config = MultiAgentSystemConfig { pattern: "pipeline".into(), ..Default::default() };
        let system = MultiAgentSystem::new(agents, store(), &config).await.unwrap();

        let out = system.execute(AgentInput::new("start")).await.unwrap();
        assert_eq!(out.content, "final");
    }

    #[tokio::test]
    async fn session_exceeding_its_timeout_is_reported() {
        #[derive(Debug)]
        struct SlowAgent;

        #[async_trait::async_trait]
        impl Agent for SlowAgent {
            fn id(&self) -> &str {
                "slow"
            }

            async fn execute(&self, input: AgentInput) -> anyhow::Result<AgentOutput> {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(AgentOutput::new(input.content))
            }

            fn state(&self) -> agentbus_common::agent::AgentState {
                agentbus_common::agent::AgentState::Idle
            }
        }

        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(SlowAgent)];
        let config = MultiAgentSystemConfig {
            pattern: "broadcast".into(),
            timeout_secs: 0, // forces an immediate timeout; see `MultiAgentSystemConfig::timeout`
            ..Default::default()
        };
        let system = MultiAgentSystem::new(agents, store(), &config).await.unwrap();

        let err = system.execute(AgentInput::new("q")).await.unwrap_err();
        assert!(matches!(err, SystemError::SessionTimeout(_)));
    }
}
