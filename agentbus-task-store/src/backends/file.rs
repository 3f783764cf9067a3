//! File-backed backend: the same in-memory indices as
//! [`crate::backends::memory::MemoryTaskStore`], persisted as a single
//! `index.json` via a temp-file-plus-rename write.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TaskStoreError},
    store::{Cursor, TaskFilter, TaskStore, TaskStoreStats, Page},
    task::{AsyncTask, TaskId},
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    tasks: HashMap<TaskId, AsyncTask>,
    order: Vec<TaskId>,
}

/// Durable [`TaskStore`] backed by a single JSON index file.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    path: PathBuf,
    index: Arc<RwLock<Index>>,
    closed: Arc<RwLock<bool>>,
}

impl FileTaskStore {
    /// Open (or create) the index file at `path`.
    ///
    /// # Errors
    /// Returns an error if the parent directory can't be created, or an
    /// existing index file is present but not valid JSON.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let index = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read(&path).await?;
            serde_json::from_slice(&raw)?
        } else {
            Index::default()
        };

        Ok(Self {
            path,
            index: Arc::new(RwLock::new(index)),
            closed: Arc::new(RwLock::new(false)),
        })
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.read()? {
            return Err(TaskStoreError::StoreClosed);
        }
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = serde_json::to_vec_pretty(&*self.index.read()?)?;
        let tmp = tmp_path(&self.path);
        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&snapshot).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn matches(task: &AsyncTask, filter: &TaskFilter) -> bool {
    filter.status.is_none_or(|s| task.status == s)
        && filter.agent_id.as_ref().is_none_or(|a| &task.agent_id == a)
        && filter
            .session_id
            .as_ref()
            .is_none_or(|s| task.session_id.as_ref() == Some(s))
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, task: AsyncTask) -> Result<()> {
        self.check_open()?;
        {
            let mut index = self.index.write()?;
            if index.tasks.contains_key(&task.id) {
                return Err(TaskStoreError::AlreadyExists(task.id));
            }
            index.order.push(task.id);
            index.tasks.insert(task.id, task);
        }
        self.persist().await
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
        {
            let mut index = self.index.write()?;
            if !index.tasks.contains_key(&task.id) {
                return Err(TaskStoreError::NotFound(task.id));
            }
            index.tasks.insert(task.id, task);
        }
        self.persist().await
    }

    async fn list(&self, filter: TaskFilter, cursor: Cursor, limit: usize) -> Result<Page> {
        self.check_open()?;
        let index = self.index.read()?;
        let matching: Vec<&AsyncTask> = index
            .order
            .iter()
            .filter_map(|id| index.tasks.get(id))
            .filter(|t| matches(t, &filter))
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
        {
            let mut index = self.index.write()?;
            index.tasks.remove(&id).ok_or(TaskStoreError::NotFound(id))?;
            index.order.retain(|existing| *existing != id);
        }
        self.persist().await
    }

    async fn cleanup(&self, age: chrono::Duration) -> Result<usize> {
        self.check_open()?;
        let removed = {
            let mut index = self.index.write()?;
            let cutoff = chrono::Utc::now() - age;
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
            doomed.len()
        };
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
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
        self.check_open()?;
        tokio::fs::try_exists(&self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[tokio::test]
    async fn persists_and_reloads_across_open_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks/index.json");

        let store = FileTaskStore::open(&path).await.unwrap();
        let mut task = AsyncTask::new("agent-1");
        task.transition(TaskStatus::Running).unwrap();
        let id = task.id;
        store.save(task).await.unwrap();

        let reopened = FileTaskStore::open(&path).await.unwrap();
        let fetched = reopened.get(id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Running);
    }
}
