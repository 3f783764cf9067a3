//! [`VersionDiff`]: the report produced by [`crate::CheckpointManager::compare_versions`].

use agentbus_checkpoint_store::Checkpoint;
use agentbus_common::agent::AgentState;

/// Counts of how a checkpoint's `metadata` map changed between two versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataDiff {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

impl MetadataDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }

    fn between(old: &Checkpoint, new: &Checkpoint) -> Self {
        let mut added = 0;
        let mut removed = 0;
        let mut changed = 0;

        for key in old.metadata.keys() {
            if !new.metadata.contains_key(key) {
                removed += 1;
            }
        }
        for (key, new_value) in &new.metadata {
            match old.metadata.get(key) {
                None => added += 1,
                Some(old_value) if old_value != new_value => changed += 1,
                Some(_) => {}
            }
        }

        Self { added, removed, changed }
    }
}

/// A structural comparison of two versions of the same thread's checkpoint
/// history, as returned by [`crate::CheckpointManager::compare_versions`].
#[derive(Debug, Clone)]
pub struct VersionDiff {
    pub thread_id: String,
    pub from_version: u64,
    pub to_version: u64,
    pub state_changed: bool,
    pub old_state: AgentState,
    pub new_state: AgentState,
    /// A one-line human-readable summary of how the message log grew or shrank.
    pub message_log_summary: String,
    pub metadata_diff: MetadataDiff,
    pub time_delta: chrono::Duration,
}

impl VersionDiff {
    pub(crate) fn compute(thread_id: &str, old: &Checkpoint, new: &Checkpoint) -> Self {
        let old_len = old.message_log.len();
        let new_len = new.message_log.len();
        let message_log_summary = match new_len.cmp(&old_len) {
            std::cmp::Ordering::Greater => format!("{old_len} -> {new_len} messages (+{})", new_len - old_len),
            std::cmp::Ordering::Less => format!("{old_len} -> {new_len} messages (-{})", old_len - new_len),
            std::cmp::Ordering::Equal => format!("{old_len} messages (unchanged)"),
        };

        Self {
            thread_id: thread_id.to_string(),
            from_version: old.version,
            to_version: new.version,
            state_changed: old.state != new.state,
            old_state: old.state.clone(),
            new_state: new.state.clone(),
            message_log_summary,
            metadata_diff: MetadataDiff::between(old, new),
            time_delta: new.created_at - old.created_at,
        }
    }
}
