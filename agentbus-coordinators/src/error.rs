//! Error type shared by every [`crate::Coordinator`].

use agentbus_common::{CoreError, ErrorKind};
use thiserror::Error;

/// Errors returned by [`crate::Coordinator::coordinate`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A pipeline stage aborted. `stage` is 1-indexed, per the glossary's
    /// "pipeline stage" definition.
    #[error("pipeline stage {stage} failed: {source}")]
    StageFailure { stage: usize, source: anyhow::Error },

    /// Every agent in the round failed (broadcast, consensus, network).
    #[error("all {0} agents failed")]
    AllFailed(usize),

    /// A single agent's turn failed outside a pipeline (debate, consensus).
    #[error("agent {agent_id} failed: {source}")]
    AgentFailure { agent_id: String, source: anyhow::Error },

    /// `coordinate` was called with no agents.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The coordinator's cancellation token fired before completion.
    #[error("coordination cancelled")]
    Cancelled,

    /// A bounded wait (the session's overall timeout) expired.
    #[error("coordination timed out")]
    Timeout,
}

impl CoreError for CoordinatorError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::StageFailure { .. } => ErrorKind::StageFailure,
            Self::AllFailed(_) | Self::AgentFailure { .. } => ErrorKind::Internal,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout => ErrorKind::Timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
