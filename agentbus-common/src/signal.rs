//! Process-lifecycle signal broadcast to background loops.

/// Sent over a `tokio::sync::broadcast` channel to tell background tasks
/// (recovery loops, auto-save loops, cleanup loops) to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop accepting new work and drain what's in flight.
    Shutdown,
    /// Draining is complete; the task may exit.
    Finalised,
}
