//! Redis-backed backend (behind the `redis-backend` feature).
//!
//! Key layout, under an operator-supplied `prefix`:
//! - `<prefix>msg:data:<id>`        — message JSON blob
//! - `<prefix>msg:topic:<topic>`    — LIST of message IDs in insertion order
//! - `<prefix>msg:pending:<topic>`  — ZSET of unacked message IDs, scored by
//!   creation time in nanoseconds, so `pending()` can fetch candidates in
//!   creation order without listing the whole topic
//!
//! `save`/`save_batch` add to both the list and the ZSET in one pipeline so
//! the two structures never observe a message in one but not the other.
//! `ack`/`delete` remove the member from the ZSET; `stats`/`cleanup`/
//! `unacked_older_than` still walk the full topic list since they need every
//! message (acked or not), while `pending` only needs the ZSET.

use agentbus_retry::RetryPolicy;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::{
    error::{MessageStoreError, Result},
    message::{Message, MessageId},
    pending::select_pending,
    store::{Cursor, MessageStore, MessageStoreStats, Page},
};

/// [`MessageStore`] backed by Redis, reachable across process restarts and
/// across multiple coordinator instances.
#[derive(Clone)]
pub struct RedisMessageStore {
    conn: ConnectionManager,
    prefix: String,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for RedisMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMessageStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisMessageStore {
    /// Connect to `url`, namespacing every key under `prefix`.
    ///
    /// # Errors
    /// Returns an error if the Redis client can't be built or the initial
    /// connection fails.
    pub async fn connect(url: &str, prefix: impl Into<String>, retry_policy: RetryPolicy) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
            retry_policy,
        })
    }

    fn data_key(&self, id: MessageId) -> String {
        format!("{}msg:data:{id}", self.prefix)
    }

    fn topic_key(&self, topic: &str) -> String {
        format!("{}msg:topic:{topic}", self.prefix)
    }

    fn pending_key(&self, topic: &str) -> String {
        format!("{}msg:pending:{topic}", self.prefix)
    }

    async fn topic_ids(&self, topic: &str) -> Result<Vec<MessageId>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(self.topic_key(topic), 0, -1).await?;
        Ok(raw.into_iter().filter_map(|s| s.parse().ok()).collect())
    }

    /// Unacked IDs for `topic`, oldest first — the ZSET's whole purpose.
    async fn pending_ids(&self, topic: &str) -> Result<Vec<MessageId>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.zrangebyscore(self.pending_key(topic), "-inf", "+inf").await?;
        Ok(raw.into_iter().filter_map(|s| s.parse().ok()).collect())
    }

    async fn fetch_many(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
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

#[async_trait]
impl MessageStore for RedisMessageStore {
    async fn save(&self, msg: Message) -> Result<()> {
        let mut conn = self.conn.clone();
        let data_key = self.data_key(msg.id);
        let exists: bool = conn.exists(&data_key).await?;
        if exists {
            return Err(MessageStoreError::AlreadyExists(msg.id));
        }
        let json = serde_json::to_string(&msg)?;
        let topic_key = self.topic_key(&msg.topic);
        let pending_key = self.pending_key(&msg.topic);
        let score = msg.created_at.timestamp_nanos_opt().unwrap_or_default();
        redis::pipe()
            .atomic()
            .set(&data_key, json)
            .rpush(&topic_key, msg.id.to_string())
            .zadd(&pending_key, msg.id.to_string(), score)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn save_batch(&self, msgs: Vec<Message>) -> Result<()> {
        let mut conn = self.conn.clone();
        for msg in &msgs {
            let exists: bool = conn.exists(self.data_key(msg.id)).await?;
            if exists {
                return Err(MessageStoreError::AlreadyExists(msg.id));
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for msg in &msgs {
            let json = serde_json::to_string(msg)?;
            let score = msg.created_at.timestamp_nanos_opt().unwrap_or_default();
            pipe.set(self.data_key(msg.id), json)
                .rpush(self.topic_key(&msg.topic), msg.id.to_string())
                .zadd(self.pending_key(&msg.topic), msg.id.to_string(), score);
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.data_key(id)).await?;
        let raw = raw.ok_or(MessageStoreError::NotFound(id))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn list(&self, topic: &str, cursor: Cursor, limit: usize) -> Result<Page> {
        let ids = self.topic_ids(topic).await?;
        let start = if cursor.0.is_empty() {
            0
        } else {
            let after: MessageId = cursor
                .0
                .parse()
                .map_err(|_| MessageStoreError::InvalidInput("malformed cursor".into()))?;
            ids.iter().position(|id| *id == after).map_or(ids.len(), |p| p + 1)
        };
        let page_ids = &ids[start.min(ids.len())..];
        let page_ids: Vec<MessageId> = page_ids.iter().take(limit).copied().collect();
        let messages = self.fetch_many(&page_ids).await?;

        let next_cursor = if start + messages.len() < ids.len() {
            messages.last().map_or(Cursor::default(), |m| Cursor(m.id.to_string()))
        } else {
            Cursor::default()
        };

        Ok(Page {
            messages,
            next_cursor,
        })
    }

    async fn ack(&self, id: MessageId) -> Result<()> {
        let mut msg = self.get(id).await?;
        msg.acked_at.get_or_insert_with(chrono::Utc::now);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(self.data_key(id), serde_json::to_string(&msg)?)
            .zrem(self.pending_key(&msg.topic), id.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn unacked_older_than(
        &self,
        topic: &str,
        age: chrono::Duration,
    ) -> Result<Vec<Message>> {
        let ids = self.topic_ids(topic).await?;
        let messages = self.fetch_many(&ids).await?;
        let cutoff = chrono::Utc::now() - age;
        Ok(messages
            .into_iter()
            .filter(|m| !m.is_acked() && m.created_at <= cutoff)
            .collect())
    }

    async fn pending(&self, topic: &str, limit: usize) -> Result<Vec<Message>> {
        let ids = self.pending_ids(topic).await?;
        let candidates = self.fetch_many(&ids).await?;
        let selected = select_pending(candidates.iter(), &self.retry_policy, limit);
        let by_id: std::collections::HashMap<_, _> =
            candidates.into_iter().map(|m| (m.id, m)).collect();
        Ok(selected.into_iter().filter_map(|id| by_id.get(&id).cloned()).collect())
    }

    async fn increment_retry(&self, id: MessageId) -> Result<()> {
        let mut msg = self.get(id).await?;
        msg.retry_count += 1;
        msg.last_retry_at = Some(chrono::Utc::now());
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.data_key(id), serde_json::to_string(&msg)?).await?;
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        let msg = self.get(id).await?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(self.data_key(id))
            .lrem(self.topic_key(&msg.topic), 1, id.to_string())
            .zrem(self.pending_key(&msg.topic), id.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn cleanup(&self, age: chrono::Duration) -> Result<usize> {
        let now = chrono::Utc::now();
        let cutoff = now - age;
        let pattern = format!("{}msg:topic:*", self.prefix);
        let mut conn = self.conn.clone();
        let topic_keys: Vec<String> = conn.keys(pattern).await?;

        let mut removed = 0;
        for topic_key in topic_keys {
            let topic = topic_key
                .strip_prefix(&format!("{}msg:topic:", self.prefix))
                .unwrap_or(&topic_key)
                .to_owned();
            let ids = self.topic_ids(&topic).await?;
            let messages = self.fetch_many(&ids).await?;
            for msg in messages {
                if (msg.is_acked() && msg.created_at <= cutoff) || msg.is_expired_at(now) {
                    self.delete(msg.id).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<MessageStoreStats> {
        let pattern = format!("{}msg:topic:*", self.prefix);
        let mut conn = self.conn.clone();
        let topic_keys: Vec<String> = conn.keys(pattern).await?;

        let mut stats = MessageStoreStats::default();
        let now = chrono::Utc::now();
        for topic_key in topic_keys {
            let topic = topic_key
                .strip_prefix(&format!("{}msg:topic:", self.prefix))
                .unwrap_or(&topic_key)
                .to_owned();
            let ids = self.topic_ids(&topic).await?;
            let messages = self.fetch_many(&ids).await?;
            stats.per_topic.insert(topic, messages.len());
            for msg in &messages {
                stats.total += 1;
                if msg.is_acked() {
                    stats.acked += 1;
                } else {
                    stats.pending += 1;
                    let age = now - msg.created_at;
                    stats.oldest_pending_age = Some(stats.oldest_pending_age.map_or(age, |cur| cur.max(age)));
                }
            }
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
