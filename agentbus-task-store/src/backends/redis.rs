//! Redis-backed backend (behind the `redis-backend` feature).
//!
//! Key layout, under an operator-supplied `prefix`:
//! - `<prefix>task:data:<id>` — task JSON blob
//! - `<prefix>task:all`       — LIST of task IDs in insertion order
//!
//! Filtering by status/agent/session happens client-side over the fetched
//! page, same as the memory and file backends, rather than through
//! server-side secondary-index ZSETs (`task:status:<status>`,
//! `task:agent:<agent-id>`, `task:session:<session-id>`) — a deliberate
//! simplification documented in this repo's design notes; the scan cost is
//! O(n) in total task count instead of O(matching).

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::{
    error::{Result, TaskStoreError},
    store::{Cursor, TaskFilter, TaskStore, TaskStoreStats, Page},
    task::{AsyncTask, TaskId},
};

#[derive(Clone)]
pub struct RedisTaskStore {
    conn: ConnectionManager,
    prefix: String,
}

impl std::fmt::Debug for RedisTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTaskStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisTaskStore {
    /// # Errors
    /// Returns an error if the Redis client can't be built or fails to connect.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn data_key(&self, id: TaskId) -> String {
        format!("{}task:data:{id}", self.prefix)
    }

    fn list_key(&self) -> String {
        format!("{}task:all", self.prefix)
    }

    async fn all_ids(&self) -> Result<Vec<TaskId>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(self.list_key(), 0, -1).await?;
        Ok(raw.into_iter().filter_map(|s| s.parse().ok()).collect())
    }

    async fn fetch_many(&self, ids: &[TaskId]) -> Result<Vec<AsyncTask>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let keys: Vec<String> = ids.iter().map(|id| self.data_key(*id)).collect();
        let raw: Vec<Option<String>> = conn.mget(keys).await?;
        Ok(raw
            .into_iter()
            .flatten()
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect())
    }
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
impl TaskStore for RedisTaskStore {
    async fn save(&self, task: AsyncTask) -> Result<()> {
        let mut conn = self.conn.clone();
        let data_key = self.data_key(task.id);
        let exists: bool = conn.exists(&data_key).await?;
        if exists {
            return Err(TaskStoreError::AlreadyExists(task.id));
        }
        let json = serde_json::to_string(&task)?;
        redis::pipe()
            .atomic()
            .set(&data_key, json)
            .rpush(self.list_key(), task.id.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<AsyncTask> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.data_key(id)).await?;
        let raw = raw.ok_or(TaskStoreError::NotFound(id))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn update(&self, task: AsyncTask) -> Result<()> {
        let mut conn = self.conn.clone();
        let data_key = self.data_key(task.id);
        let exists: bool = conn.exists(&data_key).await?;
        if !exists {
            return Err(TaskStoreError::NotFound(task.id));
        }
        conn.set::<_, _, ()>(data_key, serde_json::to_string(&task)?).await?;
        Ok(())
    }

    async fn list(&self, filter: TaskFilter, cursor: Cursor, limit: usize) -> Result<Page> {
        let ids = self.all_ids().await?;
        let all = self.fetch_many(&ids).await?;
        let matching: Vec<&AsyncTask> = all.iter().filter(|t| matches(t, &filter)).collect();

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
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(self.data_key(id))
            .lrem(self.list_key(), 1, id.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn cleanup(&self, age: chrono::Duration) -> Result<usize> {
        let ids = self.all_ids().await?;
        let all = self.fetch_many(&ids).await?;
        let cutoff = chrono::Utc::now() - age;
        let mut removed = 0;
        for task in all {
            if task.status.is_terminal() && task.completed_at.is_some_and(|c| c <= cutoff) {
                self.delete(task.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<TaskStoreStats> {
        let ids = self.all_ids().await?;
        let all = self.fetch_many(&ids).await?;
        let mut stats = TaskStoreStats::default();
        for task in &all {
            stats.total += 1;
            *stats.by_status.entry(task.status.to_string()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
