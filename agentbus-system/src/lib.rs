//! The multi-agent system façade: construct a [`agentbus_hub::MessageHub`],
//! register a mailbox per agent, pick a [`agentbus_coordinators::Coordinator`]
//! by configured pattern, and run one collaboration session at a time.

#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod system;

pub use config::MultiAgentSystemConfig;
pub use error::{Result, SystemError};
pub use system::MultiAgentSystem;
