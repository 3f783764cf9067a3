//! Runtime selection of a [`crate::TaskStore`] backend through configuration.

use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{FileTaskStore, MemoryTaskStore},
    error::Result,
    store::TaskStore,
};

#[cfg(feature = "redis-backend")]
use crate::backends::RedisTaskStore;

#[derive(Debug, Clone, Deserialize)]
pub struct FileTaskStoreConfig {
    pub path: PathBuf,
}

#[cfg(feature = "redis-backend")]
#[derive(Debug, Clone, Deserialize)]
pub struct RedisTaskStoreConfig {
    pub url: String,
    #[serde(default)]
    pub prefix: String,
}

/// Selects a task store backend at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum TaskStoreConfig {
    Memory,
    File(FileTaskStoreConfig),
    #[cfg(feature = "redis-backend")]
    Redis(RedisTaskStoreConfig),
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl TaskStoreConfig {
    /// # Errors
    /// Returns an error if a file-backed store's index can't be opened, or a
    /// Redis-backed store can't connect.
    pub async fn into_store(self) -> Result<Arc<dyn TaskStore>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryTaskStore::new())),
            Self::File(cfg) => Ok(Arc::new(FileTaskStore::open(cfg.path).await?)),
            #[cfg(feature = "redis-backend")]
            Self::Redis(cfg) => Ok(Arc::new(RedisTaskStore::connect(&cfg.url, cfg.prefix).await?)),
        }
    }
}
