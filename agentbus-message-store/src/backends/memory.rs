//! In-memory backend. No persistence across process restarts; intended for
//! testing and for coordinators that don't need durability.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use agentbus_retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::{MessageStoreError, Result},
    message::{Message, MessageId},
    pending::select_pending,
    store::{Cursor, MessageStore, MessageStoreStats, Page},
};

#[derive(Debug, Default)]
struct Index {
    messages: HashMap<MessageId, Message>,
    /// Insertion order per topic, oldest first.
    by_topic: HashMap<String, Vec<MessageId>>,
}

/// `HashMap`-backed [`MessageStore`], guarded by an `RwLock`.
#[derive(Debug, Clone)]
pub struct MemoryMessageStore {
    index: Arc<RwLock<Index>>,
    retry_policy: RetryPolicy,
    /// Maximum number of messages to hold (`None` = unlimited).
    capacity: Option<usize>,
    closed: Arc<RwLock<bool>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            index: Arc::new(RwLock::new(Index::default())),
            retry_policy,
            capacity: None,
            closed: Arc::new(RwLock::new(false)),
        }
    }

    #[must_use]
    pub fn with_capacity(retry_policy: RetryPolicy, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(retry_policy)
        }
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.read()? {
            return Err(MessageStoreError::StoreClosed);
        }
        Ok(())
    }

    fn insert(&self, index: &mut Index, msg: Message) -> Result<()> {
        if index.messages.contains_key(&msg.id) {
            return Err(MessageStoreError::AlreadyExists(msg.id));
        }
        if let Some(cap) = self.capacity {
            if index.messages.len() >= cap {
                return Err(MessageStoreError::Internal(format!(
                    "memory store capacity exceeded: {}/{cap} messages",
                    index.messages.len()
                )));
            }
        }
        index
            .by_topic
            .entry(msg.topic.clone())
            .or_default()
            .push(msg.id);
        index.messages.insert(msg.id, msg);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save(&self, msg: Message) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        self.insert(&mut index, msg)
    }

    async fn save_batch(&self, msgs: Vec<Message>) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        for msg in &msgs {
            if index.messages.contains_key(&msg.id) {
                return Err(MessageStoreError::AlreadyExists(msg.id));
            }
        }
        for msg in msgs {
            self.insert(&mut index, msg)?;
        }
        Ok(())
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
        let mut index = self.index.write()?;
        let msg = index
            .messages
            .get_mut(&id)
            .ok_or(MessageStoreError::NotFound(id))?;
        msg.acked_at.get_or_insert_with(Utc::now);
        Ok(())
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
        let mut index = self.index.write()?;
        let msg = index
            .messages
            .get_mut(&id)
            .ok_or(MessageStoreError::NotFound(id))?;
        msg.retry_count += 1;
        msg.last_retry_at = Some(Utc::now());
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        self.check_open()?;
        let mut index = self.index.write()?;
        let msg = index.messages.remove(&id).ok_or(MessageStoreError::NotFound(id))?;
        if let Some(ids) = index.by_topic.get_mut(&msg.topic) {
            ids.retain(|existing| *existing != id);
        }
        Ok(())
    }

    async fn cleanup(&self, age: chrono::Duration) -> Result<usize> {
        self.check_open()?;
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
        Ok(doomed.len())
    }

    async fn stats(&self) -> Result<MessageStoreStats> {
        self.check_open()?;
        let index = self.index.read()?;
        let mut stats = MessageStoreStats::default();
        let now: DateTime<Utc> = Utc::now();
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
        self.check_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn store() -> MemoryMessageStore {
        MemoryMessageStore::new(RetryPolicy::default())
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = store();
        let msg = Message::new("a", "b", MessageType::Proposal, "hello");
        let id = msg.id;
        store.save(msg).await.unwrap();
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.content, "hello");
    }

    #[tokio::test]
    async fn save_duplicate_id_fails() {
        let store = store();
        let msg = Message::new("a", "b", MessageType::Proposal, "hello");
        store.save(msg.clone()).await.unwrap();
        let err = store.save(msg).await.unwrap_err();
        assert!(matches!(err, MessageStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn save_batch_is_all_or_nothing() {
        let store = store();
        let first = Message::new("a", "b", MessageType::Proposal, "one");
        let dup = first.clone();
        store.save(first).await.unwrap();

        let second = Message::new("a", "b", MessageType::Proposal, "two");
        let err = store.save_batch(vec![second.clone(), dup]).await.unwrap_err();
        assert!(matches!(err, MessageStoreError::AlreadyExists(_)));

        // the non-conflicting message in the batch must not have been persisted
        assert!(store.get(second.id).await.is_err());
    }

    #[tokio::test]
    async fn ack_is_idempotent() {
        let store = store();
        let msg = Message::new("a", "b", MessageType::Proposal, "hello");
        let id = msg.id;
        store.save(msg).await.unwrap();
        store.ack(id).await.unwrap();
        let first_ack = store.get(id).await.unwrap().acked_at.unwrap();
        store.ack(id).await.unwrap();
        let second_ack = store.get(id).await.unwrap().acked_at.unwrap();
        assert_eq!(first_ack, second_ack);
    }

    #[tokio::test]
    async fn pending_excludes_acked_and_respects_limit() {
        let store = store();
        for i in 0..5 {
            store
                .save(Message::new("a", "topic", MessageType::Proposal, format!("{i}")))
                .await
                .unwrap();
        }
        let page = store.pending("topic", 3).await.unwrap();
        assert_eq!(page.len(), 3);

        store.ack(page[0].id).await.unwrap();
        let page2 = store.pending("topic", 10).await.unwrap();
        assert_eq!(page2.len(), 4);
        assert!(page2.iter().all(|m| m.id != page[0].id));
    }

    #[tokio::test]
    async fn cleanup_drops_acked_and_expired() {
        let store = store();
        let mut old_acked = Message::new("a", "topic", MessageType::Proposal, "old");
        old_acked.created_at = Utc::now() - chrono::Duration::days(2);
        old_acked.acked_at = Some(old_acked.created_at);
        let old_id = old_acked.id;

        let mut expired = Message::new("a", "topic", MessageType::Proposal, "expired");
        expired.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let expired_id = expired.id;

        let keep = Message::new("a", "topic", MessageType::Proposal, "keep");
        let keep_id = keep.id;

        store.save(old_acked).await.unwrap();
        store.save(expired).await.unwrap();
        store.save(keep).await.unwrap();

        let removed = store.cleanup(chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get(old_id).await.is_err());
        assert!(store.get(expired_id).await.is_err());
        assert!(store.get(keep_id).await.is_ok());
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = store();
        store.close().await.unwrap();
        let err = store
            .save(Message::new("a", "b", MessageType::Proposal, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MessageStoreError::StoreClosed));
    }

    #[tokio::test]
    async fn list_paginates_in_insertion_order() {
        let store = store();
        let mut ids = Vec::new();
        for i in 0..5 {
            let msg = Message::new("a", "topic", MessageType::Proposal, format!("{i}"));
            ids.push(msg.id);
            store.save(msg).await.unwrap();
        }

        let first = store.list("topic", Cursor::default(), 2).await.unwrap();
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.messages[0].id, ids[0]);
        assert!(!first.next_cursor.0.is_empty());

        let second = store.list("topic", first.next_cursor, 10).await.unwrap();
        assert_eq!(second.messages.len(), 3);
        assert!(second.next_cursor.0.is_empty());
    }
}
