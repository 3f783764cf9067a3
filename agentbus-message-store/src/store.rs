//! The storage-agnostic [`MessageStore`] contract.

use async_trait::async_trait;

use crate::{
    error::Result,
    message::{Message, MessageId},
};

/// An opaque pagination cursor. An empty cursor means "start from the
/// beginning" on input and "no more pages" on output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor(pub String);

/// A page of listed messages plus the cursor to continue from.
#[derive(Debug, Clone)]
pub struct Page {
    pub messages: Vec<Message>,
    pub next_cursor: Cursor,
}

/// Aggregate counters returned by [`MessageStore::stats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageStoreStats {
    pub total: usize,
    pub acked: usize,
    pub pending: usize,
    pub per_topic: std::collections::BTreeMap<String, usize>,
    /// Age of the oldest unacked message, if any.
    pub oldest_pending_age: Option<chrono::Duration>,
}

/// Persists messages keyed by ID and indexed by topic.
///
/// Implementations (memory / file / Redis) share this contract and the
/// pending-selection algorithm in [`crate::pending::select_pending`]; only the
/// storage medium differs.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Persist `msg`. Fails with `AlreadyExists` if `msg.id` is already stored.
    async fn save(&self, msg: Message) -> Result<()>;

    /// Persist every message in `msgs`, atomically: either all are saved or none are.
    async fn save_batch(&self, msgs: Vec<Message>) -> Result<()>;

    /// Fetch a message by ID.
    async fn get(&self, id: MessageId) -> Result<Message>;

    /// List messages for `topic` in insertion order, paginated by `cursor`/`limit`.
    async fn list(&self, topic: &str, cursor: Cursor, limit: usize) -> Result<Page>;

    /// Mark a message as acknowledged. Idempotent: acking an already-acked
    /// message leaves `acked_at` set and succeeds.
    async fn ack(&self, id: MessageId) -> Result<()>;

    /// Messages for `topic` that are unacked and older than `age`.
    async fn unacked_older_than(
        &self,
        topic: &str,
        age: chrono::Duration,
    ) -> Result<Vec<Message>>;

    /// Retry-eligible messages for `topic`, per the pending-selection algorithm.
    async fn pending(&self, topic: &str, limit: usize) -> Result<Vec<Message>>;

    /// Increment a message's retry counter and stamp `last_retry_at = now`.
    async fn increment_retry(&self, id: MessageId) -> Result<()>;

    /// Remove a message outright.
    async fn delete(&self, id: MessageId) -> Result<()>;

    /// Drop messages that are (acked AND older than `age`) OR expired.
    /// Returns the number removed.
    async fn cleanup(&self, age: chrono::Duration) -> Result<usize>;

    /// Aggregate statistics over the whole store.
    async fn stats(&self) -> Result<MessageStoreStats>;

    /// Close the store. Idempotent; subsequent operations fail with `StoreClosed`.
    async fn close(&self) -> Result<()>;

    /// Liveness check for the backing medium.
    async fn ping(&self) -> Result<()>;
}
