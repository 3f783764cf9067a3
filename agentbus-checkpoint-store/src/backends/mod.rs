//! Concrete [`crate::CheckpointStore`] implementations.

pub mod file;
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

#[cfg(feature = "redis-backend")]
pub use redis::RedisCheckpointStore;

#[cfg(feature = "postgres-backend")]
pub use postgres::PostgresCheckpointStore;
