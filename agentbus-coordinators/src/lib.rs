//! Five interchangeable multi-agent collaboration patterns, each exposing
//! the same [`Coordinator::coordinate`] operation so a caller can swap the
//! pattern driving a session without touching call sites.
//!
//! Only debate and network semantically benefit from a [`agentbus_hub::MessageHub`]
//! (exchanging intermediate proposals between rounds); pipeline, broadcast,
//! and consensus accept one too, for a host application that wants every
//! coordinator wired the same way, but don't require it.

#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub mod broadcast;
pub mod consensus;
pub mod coordinator;
pub mod debate;
pub mod error;
pub mod network;
pub mod pattern;
pub mod pipeline;

pub use broadcast::BroadcastCoordinator;
pub use consensus::ConsensusCoordinator;
pub use coordinator::Coordinator;
pub use debate::DebateCoordinator;
pub use error::{CoordinatorError, Result};
pub use network::NetworkCoordinator;
pub use pattern::{CoordinationPattern, PatternConfig};
pub use pipeline::PipelineCoordinator;
