//! Error type for the task store.

use agentbus_common::{CoreError, ErrorKind};
use thiserror::Error;

use crate::task::TaskId;

/// Errors returned by a [`crate::TaskStore`] implementation.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("store is closed")]
    StoreClosed,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Attempted to move a task out of a terminal status.
    #[error("task {0} is already in terminal status {1}")]
    TerminalStatus(TaskId, crate::task::TaskStatus),

    #[cfg(feature = "redis-backend")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for TaskStoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("lock poisoned: {e}"))
    }
}

impl CoreError for TaskStoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::StoreClosed => ErrorKind::StoreClosed,
            Self::InvalidInput(_) | Self::TerminalStatus(..) => ErrorKind::InvalidInput,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
            #[cfg(feature = "redis-backend")]
            Self::Redis(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskStoreError>;
