//! Shared types, error classification, and logging used by every crate in the
//! agentbus workspace: the message store, task store, checkpoint store,
//! message hub, coordinators, checkpoint manager, and multi-agent system all
//! depend on this crate and nothing upstream of it.

#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub mod agent;
pub mod error;
pub mod logging;
pub mod mock;
pub mod signal;
pub mod time;

pub use agent::{Agent, AgentInput, AgentOutput, AgentState};
pub use error::{CoreError, ErrorKind};
pub use mock::{EventRecorder, MockAgent};
pub use signal::Signal;

pub use tracing;
