//! Runtime selection of a [`crate::MessageStore`] backend through configuration.

use std::{path::PathBuf, sync::Arc};

use agentbus_retry::RetryPolicy;
use serde::Deserialize;

use crate::{backends::{FileMessageStore, MemoryMessageStore}, error::Result, store::MessageStore};

#[cfg(feature = "redis-backend")]
use crate::backends::RedisMessageStore;

/// Configuration for a message store's memory variant.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemoryStoreConfig {
    /// Maximum number of messages to hold (omit for unlimited).
    #[serde(default)]
    pub capacity: Option<usize>,
}

/// Configuration for a message store's file variant.
#[derive(Debug, Clone, Deserialize)]
pub struct FileStoreConfig {
    /// Path to the index file, e.g. `/var/lib/agentbus/messages/index.json`.
    pub path: PathBuf,
}

/// Configuration for a message store's Redis variant.
#[cfg(feature = "redis-backend")]
#[derive(Debug, Clone, Deserialize)]
pub struct RedisStoreConfig {
    pub url: String,
    #[serde(default)]
    pub prefix: String,
}

/// Selects a message store backend at startup. Matches the shape of the
/// other store configs (task store, checkpoint store) so a deployment can
/// mix and match backends per store.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum MessageStoreConfig {
    Memory(MemoryStoreConfig),
    File(FileStoreConfig),
    #[cfg(feature = "redis-backend")]
    Redis(RedisStoreConfig),
}

impl Default for MessageStoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryStoreConfig::default())
    }
}

impl MessageStoreConfig {
    /// Consume the configuration and build the concrete store it describes.
    ///
    /// # Errors
    /// Returns an error if a file-backed store's index can't be opened, or a
    /// Redis-backed store can't connect.
    pub async fn into_store(self, retry_policy: RetryPolicy) -> Result<Arc<dyn MessageStore>> {
        match self {
            Self::Memory(cfg) => Ok(match cfg.capacity {
                Some(capacity) => Arc::new(MemoryMessageStore::with_capacity(retry_policy, capacity)),
                None => Arc::new(MemoryMessageStore::new(retry_policy)),
            }),
            Self::File(cfg) => Ok(Arc::new(FileMessageStore::open(cfg.path, retry_policy).await?)),
            #[cfg(feature = "redis-backend")]
            Self::Redis(cfg) => Ok(Arc::new(
                RedisMessageStore::connect(&cfg.url, cfg.prefix, retry_policy).await?,
            )),
        }
    }
}
