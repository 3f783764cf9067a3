//! Mailbox-based message routing between agents.
//!
//! [`MessageHub`] sits directly on top of an
//! [`agentbus_message_store::MessageStore`]: every send is persisted before
//! it is pushed into the recipient's in-memory mailbox, so a crashed or
//! slow-to-register recipient never loses a message — [`MessageHub::recover_once`]
//! rescans the store and redelivers anything still pending.

#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub mod error;
pub mod hub;

pub use error::{HubError, Result};
pub use hub::{MessageHub, MAILBOX_CAPACITY};
