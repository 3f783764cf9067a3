//! The storage-agnostic [`CheckpointStore`] contract.

use async_trait::async_trait;

use crate::{
    checkpoint::{Checkpoint, CheckpointId},
    error::Result,
};

/// Persists versioned checkpoints per thread.
///
/// `save` and `rollback` share one invariant: the version a thread's next
/// checkpoint receives must be computed and committed atomically with
/// respect to concurrent saves on the *same* thread — two overlapping saves
/// for `thread_id` must never be handed the same version. Implementations
/// satisfy this by taking a per-thread (or whole-store) lock around "read
/// latest version, write version+1" and routing both `save` and `rollback`
/// through that one critical section, conventionally named `save_locked`.
#[async_trait]
pub trait CheckpointStore: Send + Sync + std::fmt::Debug {
    /// Save `checkpoint`. If `checkpoint.version == 0`, assigns
    /// `max(existing versions for checkpoint.thread_id) + 1` (or `1` if the
    /// thread has none yet) before persisting; a nonzero version is taken
    /// as-is (the caller already knows it, e.g. a retry of the same save).
    async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint>;

    /// Fetch a checkpoint by its globally unique ID.
    async fn load(&self, id: CheckpointId) -> Result<Checkpoint>;

    /// Fetch the highest-versioned checkpoint for a thread.
    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint>;

    /// List a thread's checkpoints, newest first, capped at `limit` entries
    /// (`0` means unbounded).
    async fn list(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>>;

    /// Fetch a specific version of a thread's checkpoint.
    async fn load_version(&self, thread_id: &str, version: u64) -> Result<Checkpoint>;

    /// List every version number a thread has, ascending.
    async fn list_versions(&self, thread_id: &str) -> Result<Vec<u64>>;

    /// Remove a single checkpoint by ID.
    async fn delete(&self, id: CheckpointId) -> Result<()>;

    /// Remove every checkpoint for a thread.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Create a new checkpoint for `thread_id` whose payload is copied from
    /// `to_version`, versioned as the new latest (never reusing
    /// `to_version` itself), with `parent_id` set to the source
    /// checkpoint's ID and `metadata[rollback_from_version]` set to
    /// `to_version`.
    async fn rollback(&self, thread_id: &str, to_version: u64) -> Result<Checkpoint>;

    /// Close the store. Idempotent; subsequent operations fail with `StoreClosed`.
    async fn close(&self) -> Result<()>;

    /// Liveness check for the backing medium.
    async fn ping(&self) -> Result<()>;
}
