//! Error type for the checkpoint manager.

use agentbus_checkpoint_store::CheckpointStoreError;
use agentbus_common::{CoreError, ErrorKind};
use thiserror::Error;

/// Errors returned by a [`crate::CheckpointManager`] operation.
#[derive(Debug, Error)]
pub enum CheckpointManagerError {
    #[error(transparent)]
    Store(#[from] CheckpointStoreError),

    #[error("agent {agent_id} does not match checkpoint's agent {checkpoint_agent_id}")]
    AgentMismatch { agent_id: String, checkpoint_agent_id: String },

    #[error("auto-save is already running for thread {0}")]
    AutoSaveAlreadyRunning(String),

    #[error("no auto-save loop is running")]
    AutoSaveNotRunning,

    #[error("agent state transition failed: {0}")]
    TransitionFailed(#[from] anyhow::Error),
}

impl CoreError for CheckpointManagerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(inner) => inner.kind(),
            Self::AgentMismatch { .. } => ErrorKind::InvalidInput,
            Self::AutoSaveAlreadyRunning(_) | Self::AutoSaveNotRunning | Self::TransitionFailed(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckpointManagerError>;
