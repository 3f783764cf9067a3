//! Error type for the message store.

use agentbus_common::{CoreError, ErrorKind};
use thiserror::Error;

use crate::message::MessageId;

/// Errors returned by a [`crate::MessageStore`] implementation.
#[derive(Debug, Error)]
pub enum MessageStoreError {
    /// I/O failure (file backend).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested message does not exist.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// A message with this ID was already saved.
    #[error("message already exists: {0}")]
    AlreadyExists(MessageId),

    /// The store was closed; no further operations are accepted.
    #[error("store is closed")]
    StoreClosed,

    /// A structurally invalid argument was supplied.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Redis backend error.
    #[cfg(feature = "redis-backend")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Lock poisoning or other internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for MessageStoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("lock poisoned: {e}"))
    }
}

impl CoreError for MessageStoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::StoreClosed => ErrorKind::StoreClosed,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
            #[cfg(feature = "redis-backend")]
            Self::Redis(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, MessageStoreError>;
