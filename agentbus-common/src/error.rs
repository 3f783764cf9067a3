//! Structural error classification shared by every crate in the workspace.
//!
//! Each crate (message store, task store, checkpoint store, hub, coordinators)
//! defines its own `thiserror`-derived error enum scoped to its own concern —
//! mirroring how the reference crate splits `SpoolError`/`DeliveryError`/
//! `ControlError` rather than sharing one giant error type. [`ErrorKind`] is
//! the thin structural spine that lets a caller match across crate boundaries
//! without caring which concrete error type produced the failure.

/// The structural category a core error falls into.
///
/// Kinds, not type names: every crate's error enum maps each of its variants
/// onto one of these so callers can make cross-cutting decisions (retry?
/// fatal? may-create?) without matching on crate-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested entity does not exist.
    NotFound,
    /// The argument was nil or structurally malformed.
    InvalidInput,
    /// The store was closed and no longer accepts operations.
    StoreClosed,
    /// A duplicate key was supplied where uniqueness is required.
    AlreadyExists,
    /// The message hub has been closed.
    Closed,
    /// `receive` was called against a mailbox that was never created.
    MailboxUnknown,
    /// A bounded wait expired before completion.
    Timeout,
    /// A pipeline stage aborted; the stage index is carried by the error.
    StageFailure,
    /// The calling cancellation token fired.
    Cancelled,
    /// Anything not covered by the above (I/O, serialization, lock poisoning, ...).
    Internal,
}

/// Implemented by every error type in the workspace so callers can classify
/// a failure without downcasting to a crate-specific error enum.
pub trait CoreError {
    /// The structural category this error falls into.
    fn kind(&self) -> ErrorKind;

    /// Shorthand for `kind() == ErrorKind::NotFound`.
    fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Shorthand for `kind() == ErrorKind::StoreClosed`, the one kind that is
    /// meant to be fatal to the caller (restart, don't retry).
    fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::StoreClosed
    }

    /// Shorthand for `kind() == ErrorKind::Timeout`.
    fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}
