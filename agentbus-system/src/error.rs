//! Error type for [`crate::MultiAgentSystem`].

use agentbus_common::{CoreError, ErrorKind};
use agentbus_coordinators::CoordinatorError;
use agentbus_hub::HubError;
use thiserror::Error;

/// Errors returned while building or running a [`crate::MultiAgentSystem`].
#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("multi-agent system requires at least one agent")]
    NoAgents,

    #[error("collaboration session exceeded its {0:?} timeout")]
    SessionTimeout(std::time::Duration),
}

impl CoreError for SystemError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Coordinator(inner) => inner.kind(),
            Self::Hub(inner) => inner.kind(),
            Self::NoAgents => ErrorKind::InvalidInput,
            Self::SessionTimeout(_) => ErrorKind::Timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, SystemError>;
