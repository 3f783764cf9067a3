//! Error type for the checkpoint store.

use agentbus_common::{CoreError, ErrorKind};
use thiserror::Error;

/// Errors returned by a [`crate::CheckpointStore`] implementation.
#[derive(Debug, Error)]
pub enum CheckpointStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no checkpoint found for thread {thread_id} at version {version}")]
    NotFound { thread_id: String, version: u64 },

    #[error("no checkpoint found with id {0}")]
    NotFoundById(String),

    #[error("thread {0} has no checkpoints")]
    ThreadEmpty(String),

    #[error("store is closed")]
    StoreClosed,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[cfg(feature = "redis-backend")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "postgres-backend")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for CheckpointStoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("lock poisoned: {e}"))
    }
}

impl CoreError for CheckpointStoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::NotFoundById(_) | Self::ThreadEmpty(_) => ErrorKind::NotFound,
            Self::StoreClosed => ErrorKind::StoreClosed,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
            #[cfg(feature = "redis-backend")]
            Self::Redis(_) => ErrorKind::Internal,
            #[cfg(feature = "postgres-backend")]
            Self::Postgres(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckpointStoreError>;
