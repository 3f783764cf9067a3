//! File-backed backend.
//!
//! Layout under `base`:
//! ```text
//! threads/<thread_id>/checkpoints/<checkpoint_id>.json
//! threads/<thread_id>/versions.json   -- [{version, id, created_at, state, summary}, ...] ascending
//! threads/<thread_id>/latest.txt      -- the latest checkpoint id, for a cheap peek
//! id_index.json                       -- {checkpoint_id: thread_id}, so load(id) doesn't need a thread
//! ```
//!
//! `save` and `rollback` both go through [`FileCheckpointStore::save_locked`],
//! which holds a single process-wide mutex for the duration of "read latest
//! version, write checkpoint file, update `versions.json`, `latest.txt`, and
//! `id_index.json`" — the one section that must never interleave across
//! concurrent callers, on any thread, or two checkpoints could be assigned
//! the same version.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    checkpoint::{Checkpoint, CheckpointId, ROLLBACK_FROM_VERSION_KEY},
    error::{CheckpointStoreError, Result},
    store::CheckpointStore,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionEntry {
    version: u64,
    id: CheckpointId,
    created_at: DateTime<Utc>,
    state: String,
    summary: String,
}

/// Durable [`CheckpointStore`] backed by one directory tree per thread.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    base: PathBuf,
    lock: Arc<Mutex<()>>,
    closed: Arc<RwLock<bool>>,
}

impl FileCheckpointStore {
    /// # Errors
    /// Returns an error if `base` can't be created.
    pub async fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        tokio::fs::create_dir_all(&base).await?;
        Ok(Self {
            base,
            lock: Arc::new(Mutex::new(())),
            closed: Arc::new(RwLock::new(false)),
        })
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.read()? {
            return Err(CheckpointStoreError::StoreClosed);
        }
        Ok(())
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.base.join("threads").join(thread_id)
    }

    fn checkpoints_dir(&self, thread_id: &str) -> PathBuf {
        self.thread_dir(thread_id).join("checkpoints")
    }

    fn versions_path(&self, thread_id: &str) -> PathBuf {
        self.thread_dir(thread_id).join("versions.json")
    }

    fn latest_path(&self, thread_id: &str) -> PathBuf {
        self.thread_dir(thread_id).join("latest.txt")
    }

    fn id_index_path(&self) -> PathBuf {
        self.base.join("id_index.json")
    }

    async fn read_versions(&self, thread_id: &str) -> Result<Vec<VersionEntry>> {
        let path = self.versions_path(thread_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn read_id_index(&self) -> Result<HashMap<CheckpointId, String>> {
        let path = self.id_index_path();
        if !tokio::fs::try_exists(&path).await? {
            return Ok(HashMap::new());
        }
        let raw = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(path);
        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// The single section that must run to completion, uninterrupted by any
    /// other save/rollback on this store, regardless of thread.
    async fn save_locked(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        let _guard = self.lock.lock().await;

        let mut versions = self.read_versions(&checkpoint.thread_id).await?;
        if checkpoint.version == 0 {
            checkpoint.version = versions.last().map_or(1, |v| v.version + 1);
        }

        let checkpoint_path = self
            .checkpoints_dir(&checkpoint.thread_id)
            .join(format!("{}.json", checkpoint.id));
        Self::write_atomic(&checkpoint_path, &serde_json::to_vec_pretty(&checkpoint)?).await?;

        versions.push(VersionEntry {
            version: checkpoint.version,
            id: checkpoint.id,
            created_at: checkpoint.created_at,
            state: checkpoint.state.to_string(),
            summary: checkpoint.summary(),
        });
        Self::write_atomic(
            &self.versions_path(&checkpoint.thread_id),
            &serde_json::to_vec_pretty(&versions)?,
        )
        .await?;
        Self::write_atomic(&self.latest_path(&checkpoint.thread_id), checkpoint.id.to_string().as_bytes()).await?;

        let mut id_index = self.read_id_index().await?;
        id_index.insert(checkpoint.id, checkpoint.thread_id.clone());
        Self::write_atomic(&self.id_index_path(), &serde_json::to_vec_pretty(&id_index)?).await?;

        Ok(checkpoint)
    }

    async fn load_from(&self, thread_id: &str, id: CheckpointId) -> Result<Checkpoint> {
        let path = self.checkpoints_dir(thread_id).join(format!("{id}.json"));
        let raw = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        self.check_open()?;
        self.save_locked(checkpoint).await
    }

    async fn load(&self, id: CheckpointId) -> Result<Checkpoint> {
        self.check_open()?;
        let index = self.read_id_index().await?;
        let thread_id = index.get(&id).ok_or_else(|| CheckpointStoreError::NotFoundById(id.to_string()))?;
        self.load_from(thread_id, id).await
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> {
        self.check_open()?;
        let versions = self.read_versions(thread_id).await?;
        let entry = versions.last().ok_or_else(|| CheckpointStoreError::ThreadEmpty(thread_id.to_string()))?;
        self.load_from(thread_id, entry.id).await
    }

    async fn list(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        self.check_open()?;
        let mut versions = self.read_versions(thread_id).await?;
        versions.reverse();
        if limit > 0 {
            versions.truncate(limit);
        }
        let mut out = Vec::with_capacity(versions.len());
        for entry in versions {
            out.push(self.load_from(thread_id, entry.id).await?);
        }
        Ok(out)
    }

    async fn load_version(&self, thread_id: &str, version: u64) -> Result<Checkpoint> {
        self.check_open()?;
        let versions = self.read_versions(thread_id).await?;
        let entry = versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| CheckpointStoreError::NotFound {
                thread_id: thread_id.to_string(),
                version,
            })?;
        self.load_from(thread_id, entry.id).await
    }

    async fn list_versions(&self, thread_id: &str) -> Result<Vec<u64>> {
        self.check_open()?;
        Ok(self.read_versions(thread_id).await?.into_iter().map(|v| v.version).collect())
    }

    async fn delete(&self, id: CheckpointId) -> Result<()> {
        self.check_open()?;
        let _guard = self.lock.lock().await;
        let mut index = self.read_id_index().await?;
        let Some(thread_id) = index.remove(&id) else {
            return Err(CheckpointStoreError::NotFoundById(id.to_string()));
        };
        Self::write_atomic(&self.id_index_path(), &serde_json::to_vec_pretty(&index)?).await?;

        let mut versions = self.read_versions(&thread_id).await?;
        versions.retain(|v| v.id != id);
        Self::write_atomic(&self.versions_path(&thread_id), &serde_json::to_vec_pretty(&versions)?).await?;

        let path = self.checkpoints_dir(&thread_id).join(format!("{id}.json"));
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.check_open()?;
        let _guard = self.lock.lock().await;
        let versions = self.read_versions(thread_id).await?;
        let mut index = self.read_id_index().await?;
        for entry in &versions {
            index.remove(&entry.id);
        }
        Self::write_atomic(&self.id_index_path(), &serde_json::to_vec_pretty(&index)?).await?;

        let dir = self.thread_dir(thread_id);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
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
        self.save_locked(next).await
    }

    async fn close(&self) -> Result<()> {
        *self.closed.write()? = true;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_open()?;
        tokio::fs::try_exists(&self.base).await?;
        Ok(())
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
    async fn survives_reopen_and_keeps_version_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();

        let reopened = FileCheckpointStore::open(dir.path()).await.unwrap();
        let history = reopened.list("t1", 0).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 2);
        assert_eq!(history[1].version, 1);

        let latest = reopened.load_latest("t1").await.unwrap();
        assert_eq!(latest.version, 2);
    }

    #[tokio::test]
    async fn rollback_appends_rather_than_rewriting_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();
        store.rollback("t1", 1).await.unwrap();

        let versions = store.list_versions("t1").await.unwrap();
        assert_eq!(versions, vec![1, 2, 3]);

        let latest = store.load_latest("t1").await.unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(latest.rollback_from_version(), Some(1));
    }

    #[tokio::test]
    async fn load_by_id_does_not_require_knowing_the_thread() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        let saved = store.save(checkpoint("t1", "a")).await.unwrap();
        let loaded = store.load(saved.id).await.unwrap();
        assert_eq!(loaded.id, saved.id);
    }

    #[tokio::test]
    async fn delete_thread_removes_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        store.save(checkpoint("t1", "a")).await.unwrap();
        store.delete_thread("t1").await.unwrap();
        assert!(matches!(
            store.load_latest("t1").await.unwrap_err(),
            CheckpointStoreError::ThreadEmpty(_)
        ));
    }
}
