//! The [`Coordinator`] contract every collaboration pattern implements.

use std::sync::Arc;

use agentbus_common::agent::{Agent, AgentInput, AgentOutput};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A strategy that drives one collaboration pattern over a fixed set of
/// agents. Every pattern takes the same shape — agents in, one output out —
/// so a [`crate::MultiAgentSystem`] (or any caller) can swap patterns
/// without touching call sites.
///
/// `cancel` is checked at the coordinator's own suspension points (between
/// rounds, between pipeline stages); an already-cancelled token causes the
/// very next check to return [`crate::CoordinatorError::Cancelled`] without
/// running another agent.
#[async_trait]
pub trait Coordinator: Send + Sync + std::fmt::Debug {
    /// Run the pattern across `agents` on `input`, producing the
    /// collaboration's single output.
    ///
    /// # Errors
    /// Returns [`crate::CoordinatorError::InvalidInput`] if `agents` is
    /// empty, [`crate::CoordinatorError::Cancelled`] if `cancel` fires
    /// before completion, or a pattern-specific error (stage failure, all
    /// agents failed) otherwise.
    async fn coordinate(
        &self,
        agents: &[Arc<dyn Agent>],
        input: AgentInput,
        cancel: CancellationToken,
    ) -> Result<AgentOutput>;
}

/// Shorthand used by every coordinator implementation to bail out at a
/// suspension point once the caller's token has fired.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(crate::error::CoordinatorError::Cancelled);
    }
    Ok(())
}
