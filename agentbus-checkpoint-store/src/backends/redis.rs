//! Redis-backed backend (behind the `redis-backend` feature).
//!
//! Key layout, under an operator-supplied `prefix`:
//! - `<prefix>:checkpoint:<id>` — checkpoint JSON blob
//! - `<prefix>:thread:<thread>` — ZSET of checkpoint IDs, scored by unix creation time
//! - `<prefix>:version:<thread>:<version>` — checkpoint ID for that version (O(1) version lookup)
//! - `<prefix>:nextver:<thread>` — counter; `INCR` assigns the next version atomically,
//!   even across multiple processes sharing the same Redis instance

use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::{
    checkpoint::{Checkpoint, CheckpointId, ROLLBACK_FROM_VERSION_KEY},
    error::{CheckpointStoreError, Result},
    store::CheckpointStore,
};

#[derive(Clone)]
pub struct RedisCheckpointStore {
    conn: ConnectionManager,
    prefix: String,
}

impl std::fmt::Debug for RedisCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCheckpointStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCheckpointStore {
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

    fn checkpoint_key(&self, id: CheckpointId) -> String {
        format!("{}:checkpoint:{id}", self.prefix)
    }

    fn thread_key(&self, thread_id: &str) -> String {
        format!("{}:thread:{thread_id}", self.prefix)
    }

    fn version_key(&self, thread_id: &str, version: u64) -> String {
        format!("{}:version:{thread_id}:{version}", self.prefix)
    }

    fn nextver_key(&self, thread_id: &str) -> String {
        format!("{}:nextver:{thread_id}", self.prefix)
    }

    async fn save_locked(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        let mut conn = self.conn.clone();
        if checkpoint.version == 0 {
            checkpoint.version = conn.incr(self.nextver_key(&checkpoint.thread_id), 1_u64).await?;
        }
        let json = serde_json::to_string(&checkpoint)?;

        redis::pipe()
            .atomic()
            .set(self.checkpoint_key(checkpoint.id), json)
            .zadd(
                self.thread_key(&checkpoint.thread_id),
                checkpoint.id.to_string(),
                checkpoint.created_at.timestamp(),
            )
            .set(self.version_key(&checkpoint.thread_id, checkpoint.version), checkpoint.id.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(checkpoint)
    }

    async fn load_raw(&self, id: CheckpointId) -> Result<Checkpoint> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.checkpoint_key(id)).await?;
        let raw = raw.ok_or_else(|| CheckpointStoreError::NotFoundById(id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        self.save_locked(checkpoint).await
    }

    async fn load(&self, id: CheckpointId) -> Result<Checkpoint> {
        self.load_raw(id).await
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(self.thread_key(thread_id), -1, -1).await?;
        let id: CheckpointId = ids
            .into_iter()
            .next()
            .ok_or_else(|| CheckpointStoreError::ThreadEmpty(thread_id.to_string()))?
            .parse()
            .map_err(|_| CheckpointStoreError::Internal("corrupt checkpoint id".into()))?;
        self.load_raw(id).await
    }

    async fn list(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        let mut conn = self.conn.clone();
        let mut ids: Vec<String> = conn.zrange(self.thread_key(thread_id), 0, -1).await?;
        ids.reverse();
        if limit > 0 {
            ids.truncate(limit);
        }
        let mut out = Vec::with_capacity(ids.len());
        for raw in ids {
            let id: CheckpointId = raw
                .parse()
                .map_err(|_| CheckpointStoreError::Internal("corrupt checkpoint id".into()))?;
            out.push(self.load_raw(id).await?);
        }
        Ok(out)
    }

    async fn load_version(&self, thread_id: &str, version: u64) -> Result<Checkpoint> {
        let mut conn = self.conn.clone();
        let id: Option<String> = conn.get(self.version_key(thread_id, version)).await?;
        let id: CheckpointId = id
            .ok_or_else(|| CheckpointStoreError::NotFound {
                thread_id: thread_id.to_string(),
                version,
            })?
            .parse()
            .map_err(|_| CheckpointStoreError::Internal("corrupt checkpoint id".into()))?;
        self.load_raw(id).await
    }

    async fn list_versions(&self, thread_id: &str) -> Result<Vec<u64>> {
        let checkpoints = self.list(thread_id, 0).await?;
        let mut versions: Vec<u64> = checkpoints.into_iter().map(|c| c.version).collect();
        versions.sort_unstable();
        Ok(versions)
    }

    async fn delete(&self, id: CheckpointId) -> Result<()> {
        let checkpoint = self.load_raw(id).await?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(self.checkpoint_key(id))
            .zrem(self.thread_key(&checkpoint.thread_id), id.to_string())
            .del(self.version_key(&checkpoint.thread_id, checkpoint.version))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(self.thread_key(thread_id), 0, -1).await?;
        let versions = self.list_versions(thread_id).await.unwrap_or_default();

        let mut keys: Vec<String> = ids.iter().map(|id| format!("{}:checkpoint:{id}", self.prefix)).collect();
        keys.extend(versions.iter().map(|v| self.version_key(thread_id, *v)));
        keys.push(self.thread_key(thread_id));
        keys.push(self.nextver_key(thread_id));
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await?;
        }
        Ok(())
    }

    async fn rollback(&self, thread_id: &str, to_version: u64) -> Result<Checkpoint> {
        let source = self.load_version(thread_id, to_version).await?;
        let mut next = source.clone();
        next.id = CheckpointId::generate();
        next.version = 0;
        next.created_at = Utc::now();
        next.parent_id = Some(source.id);
        next.metadata.insert(ROLLBACK_FROM_VERSION_KEY.to_string(), serde_json::json!(to_version));
        self.save_locked(next).await
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
