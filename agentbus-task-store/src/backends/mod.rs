//! Concrete [`crate::TaskStore`] implementations.

pub mod file;
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use file::FileTaskStore;
pub use memory::MemoryTaskStore;

#[cfg(feature = "redis-backend")]
pub use redis::RedisTaskStore;
