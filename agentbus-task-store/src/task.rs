//! The `AsyncTask` entity and its status state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskStoreError};

/// Globally unique task identifier. ULIDs sort lexicographically by creation
/// time, matching the convention used by [`agentbus_message_store::MessageId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(ulid::Ulid);

impl TaskId {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
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

/// The lifecycle stage of an [`AsyncTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    /// A terminal status never transitions back to a non-terminal one. Two
    /// terminal statuses may still transition into one another (e.g. a task
    /// already `Completed` can still be marked `Failed` by a caller that
    /// races a late error report) — see [`AsyncTask::transition`].
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout)
    }

    /// `recoverable ⇔ status ∈ {pending, running}` — the set of tasks a
    /// restart should replay.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// A unit of asynchronous agent work tracked from submission to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncTask {
    pub id: TaskId,
    /// Groups tasks spawned within the same collaboration session, for
    /// [`crate::store::TaskFilter::session_id`] and the Redis backend's
    /// per-session secondary index.
    #[serde(default)]
    pub session_id: Option<String>,
    pub agent_id: String,
    /// A free-form tag describing the kind of work (e.g. `"tool_call"`,
    /// `"reflection"`) — the core does not interpret it.
    #[serde(default)]
    pub task_type: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub input: BTreeMap<String, serde_json::Value>,
    pub output: Option<BTreeMap<String, serde_json::Value>>,
    pub error: Option<String>,
    /// Completion percentage, clamped to `[0, 100]` by [`Self::set_progress`].
    #[serde(default)]
    pub progress: u8,
    /// Higher runs first when a caller sorts [`crate::store::TaskStore::recoverable`]'s output.
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub child_ids: Vec<TaskId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_max_retries() -> u32 {
    3
}

impl AsyncTask {
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            session_id: None,
            agent_id: agent_id.into(),
            task_type: String::new(),
            status: TaskStatus::Pending,
            input: BTreeMap::new(),
            output: None,
            error: None,
            progress: 0,
            priority: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            timeout_secs: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            parent_id: None,
            child_ids: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Clamp and apply a progress update, advancing `updated_at`.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
    }

    /// Move the task to `new_status`, applying the timestamp side effects:
    /// `started_at` is set the first time a task enters `Running`,
    /// `completed_at` is set the first time it enters any terminal status,
    /// and `updated_at` advances on every call.
    ///
    /// A terminal status never transitions back to a non-terminal one (e.g.
    /// `Completed` can't become `Running` again), but one terminal status
    /// may still transition into another — a late error report arriving
    /// after a task was already marked `Completed` is accepted and moves
    /// `status` to `Failed`, without rewriting the `completed_at` already
    /// recorded for the first terminal entry.
    ///
    /// # Errors
    /// Returns [`TaskStoreError::TerminalStatus`] if `self.status` is
    /// terminal and `new_status` is not.
    pub fn transition(&mut self, new_status: TaskStatus) -> Result<()> {
        if self.status.is_terminal() && !new_status.is_terminal() {
            return Err(TaskStoreError::TerminalStatus(self.id, self.status));
        }

        let now = Utc::now();
        if new_status == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if new_status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = new_status;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_sets_started_at_once() {
        let mut task = AsyncTask::new("agent-1");
        task.transition(TaskStatus::Running).unwrap();
        let first_start = task.started_at.unwrap();

        // re-entering Running (e.g. a resumed task) must not move started_at
        std::thread::sleep(std::time::Duration::from_millis(5));
        task.status = TaskStatus::Pending;
        task.transition(TaskStatus::Running).unwrap();
        assert_eq!(task.started_at.unwrap(), first_start);
    }

    #[test]
    fn terminal_status_sets_completed_at_once() {
        let mut task = AsyncTask::new("agent-1");
        task.transition(TaskStatus::Running).unwrap();
        task.transition(TaskStatus::Completed).unwrap();
        let first_completed = task.completed_at.unwrap();

        // a late error report moving Completed -> Failed is accepted...
        std::thread::sleep(std::time::Duration::from_millis(5));
        task.transition(TaskStatus::Failed).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        // ...but never rewrites the completed_at already recorded.
        assert_eq!(task.completed_at.unwrap(), first_completed);
    }

    #[test]
    fn terminal_status_cannot_transition_back_to_non_terminal() {
        let mut task = AsyncTask::new("agent-1");
        task.transition(TaskStatus::Cancelled).unwrap();
        let err = task.transition(TaskStatus::Running).unwrap_err();
        assert!(matches!(err, TaskStoreError::TerminalStatus(_, TaskStatus::Cancelled)));
    }

    #[test]
    fn updated_at_advances_on_every_transition() {
        let mut task = AsyncTask::new("agent-1");
        let created = task.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        task.transition(TaskStatus::Running).unwrap();
        assert!(task.updated_at > created);
    }
}
