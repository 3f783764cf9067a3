//! Error type for the message hub.

use agentbus_common::{CoreError, ErrorKind};
use agentbus_message_store::MessageStoreError;
use thiserror::Error;

/// Errors returned by [`crate::MessageHub`].
#[derive(Debug, Error)]
pub enum HubError {
    /// `send` targeted an agent with no registered mailbox.
    #[error("no mailbox registered for agent {0}")]
    MailboxUnknown(String),

    /// The hub was closed; no further operations are accepted.
    #[error("hub is closed")]
    Closed,

    /// A structurally invalid argument was supplied.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The underlying message store failed.
    #[error(transparent)]
    Store(#[from] MessageStoreError),
}

impl CoreError for HubError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MailboxUnknown(_) => ErrorKind::MailboxUnknown,
            Self::Closed => ErrorKind::Closed,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
