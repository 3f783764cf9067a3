//! In-memory backend.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    error::{Result, TaskStoreError},
    store::{Cursor, TaskFilter, TaskStore, TaskStoreStats, Page},
    task::{AsyncTask, TaskId},
};

#[derive(Debug, Default)]
struct Index {
    tasks: HashMap<TaskId, AsyncTask>,
    /// Insertion order, oldest first — the basis for pagination and filtering.
    order: Vec<TaskId>,
}

/// `HashMap`-backed [`TaskStore`], guarded by an `RwLock`.
#[derive(Debug, Clone)]
pub struct MemoryTaskStore {
    index: Arc<RwLock<Index>>,
    closed: Arc<RwLock<bool>>,
}

impl MemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: Arc::new(RwLock::new(Index::default())),
            closed: Arc::new(RwLock::new(false)),
        }
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.read()? {
            return Err(TaskStoreError::StoreClosed);
        }
        Ok(())
    }

    fn matches(task: &AsyncTask, filter: &TaskFilter) -> bool {
        filter.status.is_none_or(|s| task.status == s)
            && filter
                .agent_id
                .as_ref()
                .is_none_or(|a| &task.agent_id == a)
            && filter
                .session_id
                .as_ref()
                .is_none_or(|s| task.session_id.as_ref() == Some(s))
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: AsyncTask) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        if index.tasks.contains_key(&task.id) {
            return Err(TaskStoreError::AlreadyExists(task.id));
        }
        index.order.push(task.id);
        index.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<AsyncTask> {
        self.check_open()?;
        self.index
            .read()?
            .tasks
            .get(&id)
            .cloned()
            .ok_or(TaskStoreError::NotFound(id))
    }

    async fn update(&self, task: AsyncTask) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        if !index.tasks.contains_key(&task.id) {
            return Err(TaskStoreError::NotFound(task.id));
        }
        index.tasks.insert(task.id, task);
        Ok(())
    }

    async fn list(&self, filter: TaskFilter, cursor: Cursor, limit: usize) -> Result<Page> {
        self.check_open()?;
        let index = self.index.read()?;
        let matching: Vec<&AsyncTask> = index
            .order
            .iter()
            .filter_map(|id| index.tasks.get(id))
            .filter(|t| Self::matches(t, &filter))
            .collect();

        let start = if cursor.0.is_empty() {
            0
        } else {
            let after: TaskId = cursor
                .0
                .parse()
                .map_err(|_| TaskStoreError::InvalidInput("malformed cursor".into()))?;
            matching
                .iter()
                .position(|t| t.id == after)
                .map_or(matching.len(), |p| p + 1)
        };

        let page: Vec<AsyncTask> = matching[start.min(matching.len())..]
            .iter()
            .take(limit)
            .map(|t| (*t).clone())
            .collect();

        let next_cursor = if start + page.len() < matching.len() {
            page.last().map_or(Cursor::default(), |t| Cursor(t.id.to_string()))
        } else {
            Cursor::default()
        };

        Ok(Page {
            tasks: page,
            next_cursor,
        })
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        index.tasks.remove(&id).ok_or(TaskStoreError::NotFound(id))?;
        index.order.retain(|existing| *existing != id);
        Ok(())
    }

    async fn cleanup(&self, age: chrono::Duration) -> Result<usize> {
        self.check_open()?;
        let mut index = self.index.write()?;
        let cutoff = Utc::now() - age;
        let doomed: Vec<TaskId> = index
            .tasks
            .values()
            .filter(|t| t.status.is_terminal() && t.completed_at.is_some_and(|c| c <= cutoff))
            .map(|t| t.id)
            .collect();

        for id in &doomed {
            index.tasks.remove(id);
        }
        index.order.retain(|id| !doomed.contains(id));
        Ok(doomed.len())
    }

    async fn stats(&self) -> Result<TaskStoreStats> {
        self.check_open()?;
        let index = self.index.read()?;
        let mut stats = TaskStoreStats::default();
        for task in index.tasks.values() {
            stats.total += 1;
            *stats.by_status.entry(task.status.to_string()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        *self.closed.write()? = true;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_open()
    }
}
