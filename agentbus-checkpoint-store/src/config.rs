//! Runtime selection of a [`crate::CheckpointStore`] backend through configuration.

use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{FileCheckpointStore, MemoryCheckpointStore},
    error::Result,
    store::CheckpointStore,
};

#[cfg(feature = "redis-backend")]
use crate::backends::RedisCheckpointStore;

#[cfg(feature = "postgres-backend")]
use crate::backends::PostgresCheckpointStore;

#[derive(Debug, Clone, Deserialize)]
pub struct FileCheckpointStoreConfig {
    pub base: PathBuf,
}

#[cfg(feature = "redis-backend")]
#[derive(Debug, Clone, Deserialize)]
pub struct RedisCheckpointStoreConfig {
    pub url: String,
    #[serde(default)]
    pub prefix: String,
}

#[cfg(feature = "postgres-backend")]
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresCheckpointStoreConfig {
    pub database_url: String,
}

/// Selects a checkpoint store backend at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum CheckpointStoreConfig {
    Memory,
    File(FileCheckpointStoreConfig),
    #[cfg(feature = "redis-backend")]
    Redis(RedisCheckpointStoreConfig),
    #[cfg(feature = "postgres-backend")]
    Postgres(PostgresCheckpointStoreConfig),
}

impl Default for CheckpointStoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl CheckpointStoreConfig {
    /// # Errors
    /// Returns an error if the selected backend fails to open or connect.
    pub async fn into_store(self) -> Result<Arc<dyn CheckpointStore>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
            Self::File(cfg) => Ok(Arc::new(FileCheckpointStore::open(cfg.base).await?)),
            #[cfg(feature = "redis-backend")]
            Self::Redis(cfg) => Ok(Arc::new(RedisCheckpointStore::connect(&cfg.url, cfg.prefix).await?)),
            #[cfg(feature = "postgres-backend")]
            Self::Postgres(cfg) => Ok(Arc::new(PostgresCheckpointStore::connect(&cfg.database_url).await?)),
        }
    }
}
