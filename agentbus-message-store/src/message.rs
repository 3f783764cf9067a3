//! The `Message` entity and its identifier.

use std::collections::BTreeMap;

use agentbus_retry::Retryable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Globally unique message identifier. ULIDs are lexicographically sortable
/// by creation time, so a store's insertion-order index and a plain sort of
/// IDs agree with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(ulid::Ulid);

impl MessageId {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ulid::Ulid::from_string(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// The kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Proposal,
    Response,
    Vote,
    Consensus,
    Broadcast,
}

/// A message routed through the bus and persisted by the message store.
///
/// `topic` is the routing key: it equals the recipient ID for point-to-point
/// messages, and is empty for broadcast. `recipient_id` empty also means
/// broadcast — the two fields are kept distinct because a future routing
/// scheme (e.g. topic groups distinct from a single recipient) could diverge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub acked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a new, unacked, unretried message. `id` and `created_at` are
    /// filled in here if the caller leaves them at their defaults — the hub
    /// and the store both rely on this to avoid duplicating ID generation.
    #[must_use]
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        let recipient_id = recipient_id.into();
        Self {
            id: MessageId::generate(),
            topic: recipient_id.clone(),
            sender_id: sender_id.into(),
            recipient_id,
            message_type,
            content: content.into(),
            payload: BTreeMap::new(),
            created_at: Utc::now(),
            acked_at: None,
            retry_count: 0,
            last_retry_at: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.recipient_id.is_empty()
    }

    #[must_use]
    pub fn is_acked(&self) -> bool {
        self.acked_at.is_some()
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

impl Retryable for Message {
    fn acked(&self) -> bool {
        self.is_acked()
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.is_expired_at(now)
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn last_retry_at(&self) -> Option<DateTime<Utc>> {
        self.last_retry_at
    }
}
