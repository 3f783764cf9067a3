//! The `Checkpoint` entity.

use std::collections::BTreeMap;

use agentbus_common::agent::AgentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key a rollback stamps on the checkpoint it produces, carrying
/// the version it copied from. Read it with [`Checkpoint::rollback_from_version`].
pub const ROLLBACK_FROM_VERSION_KEY: &str = "rollback_from_version";

/// Globally unique checkpoint identifier.
///
/// Backed by a ULID: monotone-ish under a single process, collision-free
/// across concurrent writers because the random component absorbs any
/// same-millisecond race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckpointId(ulid::Ulid);

impl CheckpointId {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CheckpointId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for CheckpointId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for CheckpointId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ulid::Ulid::from_string(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Workflow-shaped state a checkpoint may carry alongside the agent's plain
/// `state` enum, for agents driven by a graph of nodes rather than a flat
/// lifecycle. Absent for agents that don't use one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub workflow_id: Option<String>,
    pub current_node: Option<String>,
    #[serde(default)]
    pub node_results: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
}

/// A versioned snapshot of an agent's state within a thread.
///
/// Versions are assigned per `thread_id`, starting at 1 and incrementing by
/// one on every save within that thread — never reused, even after a
/// rollback (a rollback creates a new, higher version whose payload copies
/// an earlier one; it never resurrects the old version number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub thread_id: String,
    pub agent_id: String,
    /// `0` means "not yet assigned" — `CheckpointStore::save` assigns
    /// `max(existing) + 1` for the thread before persisting.
    pub version: u64,
    pub state: AgentState,
    #[serde(default)]
    pub message_log: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<CheckpointId>,
    pub execution_context: Option<ExecutionContext>,
}

impl Checkpoint {
    /// Build a fresh checkpoint with version 0 (unassigned) and `created_at`
    /// left for the store to stamp on save.
    #[must_use]
    pub fn new(thread_id: impl Into<String>, agent_id: impl Into<String>, state: AgentState) -> Self {
        Self {
            id: CheckpointId::generate(),
            thread_id: thread_id.into(),
            agent_id: agent_id.into(),
            version: 0,
            state,
            message_log: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            parent_id: None,
            execution_context: None,
        }
    }

    /// The source version this checkpoint was rolled back from, if
    /// [`ROLLBACK_FROM_VERSION_KEY`] is present in `metadata`.
    #[must_use]
    pub fn rollback_from_version(&self) -> Option<u64> {
        self.metadata.get(ROLLBACK_FROM_VERSION_KEY)?.as_u64()
    }

    /// A one-line description of this checkpoint for the file backend's
    /// `versions.json` sidecar index.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} messages, state={}", self.message_log.len(), self.state)
    }
}
