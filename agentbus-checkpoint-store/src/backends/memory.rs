//! In-memory backend.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    checkpoint::{Checkpoint, CheckpointId, ROLLBACK_FROM_VERSION_KEY},
    error::{CheckpointStoreError, Result},
    store::CheckpointStore,
};

#[derive(Debug, Default)]
struct Index {
    /// Every checkpoint, keyed by its globally unique ID.
    by_id: HashMap<CheckpointId, Checkpoint>,
    /// Per-thread IDs in ascending version order.
    by_thread: HashMap<String, Vec<CheckpointId>>,
}

/// `HashMap`-backed [`CheckpointStore`]. A single `RwLock` over the whole
/// index serializes version assignment across threads — see
/// [`MemoryCheckpointStore::save_locked`].
#[derive(Debug, Clone)]
pub struct MemoryCheckpointStore {
    index: Arc<RwLock<Index>>,
    closed: Arc<RwLock<bool>>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: Arc::new(RwLock::new(Index::default())),
            closed: Arc::new(RwLock::new(false)),
        }
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.read()? {
            return Err(CheckpointStoreError::StoreClosed);
        }
        Ok(())
    }

    /// Assign a version (if unassigned) and insert, holding the write lock
    /// for the whole "read latest, assign, insert" section so no concurrent
    /// call can observe the same latest version.
    fn save_locked(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        let mut index = self.index.write()?;
        let ids = index.by_thread.entry(checkpoint.thread_id.clone()).or_default();

        if checkpoint.version == 0 {
            let max = ids
                .last()
                .and_then(|id| index.by_id.get(id))
                .map_or(0, |c| c.version);
            checkpoint.version = max + 1;
        }

        let ids = index.by_thread.get_mut(&checkpoint.thread_id).expect("just inserted");
        ids.push(checkpoint.id);
        index.by_id.insert(checkpoint.id, checkpoint.clone());
        Ok(checkpoint)
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        self.check_open()?;
        self.save_locked(checkpoint)
    }

    async fn load(&self, id: CheckpointId) -> Result<Checkpoint> {
        self.check_open()?;
        self.index
            .read()?
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| CheckpointStoreError::NotFoundById(id.to_string()))
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> {
        self.check_open()?;
        let index = self.index.read()?;
        index
            .by_thread
            .get(thread_id)
            .and_then(|ids| ids.last())
            .and_then(|id| index.by_id.get(id))
            .cloned()
            .ok_or_else(|| CheckpointStoreError::ThreadEmpty(thread_id.to_string()))
    }

    async fn list(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        self.check_open()?;
        let index = self.index.read()?;
        let Some(ids) = index.by_thread.get(thread_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Checkpoint> = ids.iter().rev().filter_map(|id| index.by_id.get(id)).cloned().collect();
        if limit > 0 {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn load_version(&self, thread_id: &str, version: u64) -> Result<Checkpoint> {
        self.check_open()?;
        let index = self.index.read()?;
        index
            .by_thread
            .get(thread_id)
            .and_then(|ids| ids.iter().find_map(|id| index.by_id.get(id).filter(|c| c.version == version)))
            .cloned()
            .ok_or_else(|| CheckpointStoreError::NotFound {
                thread_id: thread_id.to_string(),
                version,
            })
    }

    async fn list_versions(&self, thread_id: &str) -> Result<Vec<u64>> {
        self.check_open()?;
        let index = self.index.read()?;
        Ok(index
            .by_thread
            .get(thread_id)
            .map(|ids| ids.iter().filter_map(|id| index.by_id.get(id)).map(|c| c.version).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, id: CheckpointId) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        let Some(checkpoint) = index.by_id.remove(&id) else {
            return Err(CheckpointStoreError::NotFoundById(id.to_string()));
        };
        if let Some(ids) = index.by_thread.get_mut(&checkpoint.thread_id) {
            ids.retain(|existing| *existing != id);
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        if let Some(ids) = index.by_thread.remove(thread_id) {
            for id in ids {
                index.by_id.remove(&id);
            }
        }
        Ok(())
    }

    async fn rollback(&self, thread_id: &str, to_version: u64) -> Result<Checkpoint> {
        self.check_open()?;
        let source = self.load_version(thread_id, to_version).await?;
        let mut next = source.clone();
        next.id = CheckpointId::generate();
        next.version = 0;
        next.created_at = Utc::now();
        next.parent_id = Some(source.id);
        next.metadata.insert(ROLLBACK_FROM_VERSION_KEY.to_string(), serde_json::json!(to_version));
        self.save_locked(next)
    }

    async fn close(&self) -> Result<()> {
        *self.closed.write()? = true;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbus_common::agent::AgentState;

    fn checkpoint(thread: &str, agent: &str) -> Checkpoint {
        Checkpoint::new(thread, agent, AgentState::Running)
    }

    #[tokio::test]
    async fn versions_increment_from_one() {
        let store = MemoryCheckpointStore::new();
        let c1 = store.save(checkpoint("t1", "a")).await.unwrap();
        let c2 = store.save(checkpoint("t1", "a")).await.unwrap();
        assert_eq!(c1.version, 1);
        assert_eq!(c2.version, 2);
    }

    #[tokio::test]
    async fn rollback_creates_new_version_copying_old_payload() {
        let store = MemoryCheckpointStore::new();
        let v1 = store.save(checkpoint("t1", "a")).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();

        let rolled = store.rollback("t1", 1).await.unwrap();
        assert_eq!(rolled.version, 3);
        assert_eq!(rolled.parent_id, Some(v1.id));
        assert_eq!(rolled.rollback_from_version(), Some(1));

        let latest = store.load_latest("t1").await.unwrap();
        assert_eq!(latest.version, 3);
    }

    #[tokio::test]
    async fn concurrent_saves_never_collide_on_version() {
        let store = MemoryCheckpointStore::new();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.save(checkpoint("t1", "a")).await.unwrap() }));
        }
        let mut versions: Vec<u64> = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap().version);
        }
        versions.sort_unstable();
        versions.dedup();
        assert_eq!(versions.len(), 50);
        assert_eq!(versions, (1..=50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn list_is_empty_for_unknown_thread() {
        let store = MemoryCheckpointStore::new();
        assert!(store.list("unknown", 0).await.unwrap().is_empty());
        assert!(matches!(
            store.load_latest("unknown").await.unwrap_err(),
            CheckpointStoreError::ThreadEmpty(_)
        ));
    }

    #[tokio::test]
    async fn list_newest_first_and_respects_limit() {
        let store = MemoryCheckpointStore::new();
        store.save(checkpoint("t1", "a")).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();

        let all = store.list("t1", 0).await.unwrap();
        assert_eq!(all.iter().map(|c| c.version).collect::<Vec<_>>(), vec![3, 2, 1]);

        let capped = store.list("t1", 2).await.unwrap();
        assert_eq!(capped.iter().map(|c| c.version).collect::<Vec<_>>(), vec![3, 2]);
    }
}
