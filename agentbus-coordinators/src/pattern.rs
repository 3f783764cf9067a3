//! The selector [`CoordinationPattern`] a [`crate::MultiAgentSystem`] (or any
//! caller) picks a [`crate::Coordinator`] with.

use std::sync::Arc;

use agentbus_hub::MessageHub;
use serde::{Deserialize, Serialize};

use crate::{
    broadcast::BroadcastCoordinator, consensus::ConsensusCoordinator, coordinator::Coordinator,
    debate::DebateCoordinator, network::NetworkCoordinator, pipeline::PipelineCoordinator,
};

/// One of the five interchangeable collaboration patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationPattern {
    #[default]
    Debate,
    Consensus,
    Pipeline,
    Broadcast,
    Network,
}

/// Tunables that only some patterns use; harmless to pass to all of them.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    pub max_rounds: usize,
    pub consensus_threshold: f64,
    pub enable_voting: bool,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self { max_rounds: 3, consensus_threshold: 0.5, enable_voting: false }
    }
}

impl CoordinationPattern {
    /// Parse a pattern name from loose external input (a config file, a CLI
    /// flag). An unrecognised name degrades to [`Self::Debate`] rather than
    /// failing startup over a typo.
    #[must_use]
    pub fn parse_or_default(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "consensus" => Self::Consensus,
            "pipeline" => Self::Pipeline,
            "broadcast" => Self::Broadcast,
            "network" => Self::Network,
            "debate" => Self::Debate,
            other => {
                tracing::warn!(pattern = other, "unknown coordination pattern, defaulting to debate");
                Self::Debate
            }
        }
    }

    /// Build the concrete [`Coordinator`] this variant names, wired to `hub`.
    #[must_use]
    pub fn build(self, config: &PatternConfig, hub: Arc<MessageHub>) -> Box<dyn Coordinator> {
        match self {
            Self::Debate => Box::new(DebateCoordinator::with_hub(config.max_rounds, hub)),
            Self::Consensus => {
                Box::new(ConsensusCoordinator::with_hub(config.consensus_threshold, config.enable_voting, hub))
            }
            Self::Pipeline => Box::new(PipelineCoordinator::with_hub(hub)),
            Self::Broadcast => Box::new(BroadcastCoordinator::with_hub(hub)),
            Self::Network => Box::new(NetworkCoordinator::with_hub(hub)),
        }
    }
}
