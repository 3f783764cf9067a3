//! End-to-end collaboration sessions through the real façade, each pattern
//! selected purely by its configured name.

use std::sync::Arc;

use agentbus_common::{agent::Agent, mock::MockAgent, AgentInput};
use agentbus_message_store::{backends::MemoryMessageStore, MessageStore};
use agentbus_retry::RetryPolicy;
use agentbus_system::{MultiAgentSystem, MultiAgentSystemConfig};

fn store() -> Arc<dyn MessageStore> {
    Arc::new(MemoryMessageStore::new(RetryPolicy::default()))
}

#[tokio::test]
async fn debate_session_runs_every_agent_at_least_twice_with_one_round() {
    let a = Arc::new(MockAgent::new("a", ["opinion A"]));
    let b = Arc::new(MockAgent::new("b", ["opinion B"]));
    let agents: Vec<Arc<dyn Agent>> = vec![a.clone(), b.clone()];

    let config = MultiAgentSystemConfig { pattern: "debate".into(), max_rounds: 1, ..Default::default() };
    let system = MultiAgentSystem::new(agents, store(), &config).await.unwrap();

    let out = system.execute(AgentInput::new("What is best?")).await.unwrap();
    assert!(!out.content.is_empty());
    assert!(a.call_count() >= 2);
    assert!(b.call_count() >= 2);
}

#[tokio::test]
async fn broadcast_session_concatenates_every_agent() {
    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(MockAgent::new("a", ["alpha"])),
        Arc::new(MockAgent::new("b", ["beta"])),
    ];
    let config = MultiAgentSystemConfig { pattern: "broadcast".into(), ..Default::default() };
    let system = MultiAgentSystem::new(agents, store(), &config).await.unwrap();

    let out = system.execute(AgentInput::new("topic")).await.unwrap();
    assert!(out.content.contains("alpha"));
    assert!(out.content.contains("beta"));
}

#[tokio::test]
async fn shutdown_is_idempotent_and_the_system_can_still_be_queried() {
    let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(MockAgent::new("a", ["hi"]))];
    let system = MultiAgentSystem::new(agents, store(), &MultiAgentSystemConfig::default()).await.unwrap();

    system.shutdown().await.unwrap();
    system.shutdown().await.unwrap();
    assert_eq!(system.agents().len(), 1);
}
