//! The storage-agnostic [`TaskStore`] contract.

use async_trait::async_trait;

use crate::{
    error::Result,
    task::{AsyncTask, TaskId, TaskStatus},
};

/// Opaque pagination cursor, same convention as the message store's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor(pub String);

#[derive(Debug, Clone)]
pub struct Page {
    pub tasks: Vec<AsyncTask>,
    pub next_cursor: Cursor,
}

/// Narrows a [`TaskStore::list`] call. `None` on a field means "no filter on
/// this dimension"; all non-empty fields conjoin.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStoreStats {
    pub total: usize,
    pub by_status: std::collections::BTreeMap<String, usize>,
}

/// Persists [`AsyncTask`] records keyed by ID, with filtered listing.
#[async_trait]
pub trait TaskStore: Send + Sync + std::fmt::Debug {
    /// Persist `task`. Fails with `AlreadyExists` if `task.id` is already stored.
    async fn save(&self, task: AsyncTask) -> Result<()>;

    /// Fetch a task by ID.
    async fn get(&self, id: TaskId) -> Result<AsyncTask>;

    /// Replace the stored task with `task` in full (the caller has already
    /// called [`AsyncTask::transition`] or otherwise mutated its fields).
    async fn update(&self, task: AsyncTask) -> Result<()>;

    /// List tasks matching `filter`, in insertion order, paginated.
    async fn list(&self, filter: TaskFilter, cursor: Cursor, limit: usize) -> Result<Page>;

    /// Remove a task outright.
    async fn delete(&self, id: TaskId) -> Result<()>;

    /// Drop terminal tasks completed more than `age` ago. Returns the count removed.
    async fn cleanup(&self, age: chrono::Duration) -> Result<usize>;

    /// Aggregate statistics over the whole store.
    async fn stats(&self) -> Result<TaskStoreStats>;

    /// Close the store. Idempotent; subsequent operations fail with `StoreClosed`.
    async fn close(&self) -> Result<()>;

    /// Liveness check for the backing medium.
    async fn ping(&self) -> Result<()>;

    /// Move `id` to `status`, optionally attaching a result payload or an
    /// error message, via [`AsyncTask::transition`]'s timestamp rules.
    async fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: Option<std::collections::BTreeMap<String, serde_json::Value>>,
        err_msg: Option<String>,
    ) -> Result<()> {
        let mut task = self.get(id).await?;
        task.transition(status)?;
        if result.is_some() {
            task.output = result;
        }
        if err_msg.is_some() {
            task.error = err_msg;
        }
        self.update(task).await
    }

    /// Apply [`AsyncTask::set_progress`] to the stored task.
    async fn update_progress(&self, id: TaskId, progress: u8) -> Result<()> {
        let mut task = self.get(id).await?;
        task.set_progress(progress);
        self.update(task).await
    }

    /// Every task a restart should replay — `status ∈ {pending, running}` —
    /// ordered by descending priority then ascending creation time.
    async fn recoverable(&self) -> Result<Vec<AsyncTask>> {
        let mut out = Vec::new();
        let mut cursor = Cursor::default();
        loop {
            let page = self.list(TaskFilter::default(), cursor, 256).await?;
            let next = page.next_cursor.clone();
            out.extend(page.tasks.into_iter().filter(|t| t.status.is_recoverable()));
            if next == Cursor::default() {
                break;
            }
            cursor = next;
        }
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }
}
