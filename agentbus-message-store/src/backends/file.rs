//! File-backed backend. Keeps the same in-memory indices as
//! [`crate::backends::memory::MemoryMessageStore`], but persists them as a
//! single `index.json` after every mutation, written via a temp-file-plus-
//! rename so a crash mid-write never leaves a corrupt index on disk.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use agentbus_retry::RetryPolicy;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MessageStoreError, Result},
    message::{Message, MessageId},
    pending::select_pending,
    store::{Cursor, MessageStore, MessageStoreStats, Page},
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    messages: HashMap<MessageId, Message>,
    by_topic: HashMap<String, Vec<MessageId>>,
}

/// Durable [`MessageStore`] backed by a single JSON index file.
#[derive(Debug, Clone)]
pub struct FileMessageStore {
    path: PathBuf,
    index: Arc<RwLock<Index>>,
    retry_policy: RetryPolicy,
    closed: Arc<RwLock<bool>>,
}

impl FileMessageStore {
    /// Open (or create) the index file at `path`.
    ///
    /// # Errors
    /// Returns an error if the parent directory can't be created, or if an
    /// existing index file is present but not valid JSON.
    pub async fn open(path: impl Into<PathBuf>, retry_policy: RetryPolicy) -> Result<Self> {
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
            retry_policy,
            closed: Arc::new(RwLock::new(false)),
        })
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.read()? {
            return Err(MessageStoreError::StoreClosed);
        }
        Ok(())
    }

    /// Serialize the current index and atomically replace the file on disk:
    /// write to a sibling `.tmp` file, `fsync`, then rename over the target.
    async fn persist(&self, snapshot: Vec<u8>) -> Result<()> {
        let tmp = tmp_path(&self.path);
        let file = tokio::fs::File::create(&tmp).await?;
        {
            use tokio::io::AsyncWriteExt;
            let mut file = file;
            file.write_all(&snapshot).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn insert(&self, index: &mut Index, msg: Message) -> Result<()> {
        if index.messages.contains_key(&msg.id) {
            return Err(MessageStoreError::AlreadyExists(msg.id));
        }
        index
            .by_topic
            .entry(msg.topic.clone())
            .or_default()
            .push(msg.id);
        index.messages.insert(msg.id, msg);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&*self.index.read()?)?)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn save(&self, msg: Message) -> Result<()> {
        self.check_open()?;
        {
            let mut index = self.index.write()?;
            self.insert(&mut index, msg)?;
        }
        self.persist(self.snapshot()?).await
    }

    async fn save_batch(&self, msgs: Vec<Message>) -> Result<()> {
        self.check_open()?;
        {
            let mut index = self.index.write()?;
            for msg in &msgs {
                if index.messages.contains_key(&msg.id) {
                    return Err(MessageStoreError::AlreadyExists(msg.id));
                }
            }
            for msg in msgs {
                self.insert(&mut index, msg)?;
            }
        }
        self.persist(self.snapshot()?).await
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        self.check_open()?;
        self.index
            .read()?
            .messages
            .get(&id)
            .cloned()
            .ok_or(MessageStoreError::NotFound(id))
    }

    async fn list(&self, topic: &str, cursor: Cursor, limit: usize) -> Result<Page> {
        self.check_open()?;
        let index = self.index.read()?;
        let Some(ids) = index.by_topic.get(topic) else {
            return Ok(Page {
                messages: Vec::new(),
                next_cursor: Cursor::default(),
            });
        };

        let start = if cursor.0.is_empty() {
            0
        } else {
            let after: MessageId = cursor
                .0
                .parse()
                .map_err(|_| MessageStoreError::InvalidInput("malformed cursor".into()))?;
            ids.iter().position(|id| *id == after).map_or(ids.len(), |p| p + 1)
        };

        let page: Vec<Message> = ids[start..]
            .iter()
            .take(limit)
            .filter_map(|id| index.messages.get(id).cloned())
            .collect();

        let next_cursor = if start + page.len() < ids.len() {
            page.last().map_or(Cursor::default(), |m| Cursor(m.id.to_string()))
        } else {
            Cursor::default()
        };

        Ok(Page {
            messages: page,
            next_cursor,
        })
    }

    async fn ack(&self, id: MessageId) -> Result<()> {
        self.check_open()?;
        {
            let mut index = self.index.write()?;
            let msg = index
                .messages
                .get_mut(&id)
                .ok_or(MessageStoreError::NotFound(id))?;
            msg.acked_at.get_or_insert_with(Utc::now);
        }
        self.persist(self.snapshot()?).await
    }

    async fn unacked_older_than(
        &self,
        topic: &str,
        age: chrono::Duration,
    ) -> Result<Vec<Message>> {
        self.check_open()?;
        let index = self.index.read()?;
        let cutoff = Utc::now() - age;
        Ok(index
            .by_topic
            .get(topic)
            .into_iter()
            .flatten()
            .filter_map(|id| index.messages.get(id))
            .filter(|m| !m.is_acked() && m.created_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn pending(&self, topic: &str, limit: usize) -> Result<Vec<Message>> {
        self.check_open()?;
        let index = self.index.read()?;
        let candidates: Vec<&Message> = index
            .by_topic
            .get(topic)
            .into_iter()
            .flatten()
            .filter_map(|id| index.messages.get(id))
            .collect();
        let selected = select_pending(candidates.into_iter(), &self.retry_policy, limit);
        Ok(selected
            .into_iter()
            .filter_map(|id| index.messages.get(&id).cloned())
            .collect())
    }

    async fn increment_retry(&self, id: MessageId) -> Result<()> {
        self.check_open()?;
        {
            let mut index = self.index.write()?;
            let msg = index
                .messages
                .get_mut(&id)
                .ok_or(MessageStoreError::NotFound(id))?;
            msg.retry_count += 1;
            msg.last_retry_at = Some(Utc::now());
        }
        self.persist(self.snapshot()?).await
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        self.check_open()?;
        {
            let mut index = self.index.write()?;
            let msg = index.messages.remove(&id).ok_or(MessageStoreError::NotFound(id))?;
            if let Some(ids) = index.by_topic.get_mut(&msg.topic) {
                ids.retain(|existing| *existing != id);
            }
        }
        self.persist(self.snapshot()?).await
    }

    async fn cleanup(&self, age: chrono::Duration) -> Result<usize> {
        self.check_open()?;
        let removed = {
            let mut index = self.index.write()?;
            let now = Utc::now();
            let cutoff = now - age;
            let doomed: Vec<MessageId> = index
                .messages
                .values()
                .filter(|m| (m.is_acked() && m.created_at <= cutoff) || m.is_expired_at(now))
                .map(|m| m.id)
                .collect();

            for id in &doomed {
                if let Some(msg) = index.messages.remove(id) {
                    if let Some(ids) = index.by_topic.get_mut(&msg.topic) {
                        ids.retain(|existing| existing != id);
                    }
                }
            }
            doomed.len()
        };
        if removed > 0 {
            self.persist(self.snapshot()?).await?;
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<MessageStoreStats> {
        self.check_open()?;
        let index = self.index.read()?;
        let mut stats = MessageStoreStats::default();
        let now = Utc::now();
        for msg in index.messages.values() {
            stats.total += 1;
            *stats.per_topic.entry(msg.topic.clone()).or_insert(0) += 1;
            if msg.is_acked() {
                stats.acked += 1;
            } else {
                stats.pending += 1;
                let age = now - msg.created_at;
                stats.oldest_pending_age = Some(stats.oldest_pending_age.map_or(age, |cur| cur.max(age)));
            }
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
    use crate::message::MessageType;

    #[tokio::test]
    async fn persists_and_reloads_across_open_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages/index.json");

        let store = FileMessageStore::open(&path, RetryPolicy::default()).await.unwrap();
        let msg = Message::new("a", "b", MessageType::Proposal, "hello");
        let id = msg.id;
        store.save(msg).await.unwrap();

        let reopened = FileMessageStore::open(&path, RetryPolicy::default()).await.unwrap();
        let fetched = reopened.get(id).await.unwrap();
        assert_eq!(fetched.content, "hello");
    }

    #[tokio::test]
    async fn tmp_file_is_cleaned_up_by_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = FileMessageStore::open(&path, RetryPolicy::default()).await.unwrap();
        store
            .save(Message::new("a", "b", MessageType::Proposal, "x"))
            .await
            .unwrap();
        assert!(!tmp_path(&path).exists());
        assert!(path.exists());
    }
}
