//! Concrete [`crate::MessageStore`] implementations.

pub mod file;
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use file::FileMessageStore;
pub use memory::MemoryMessageStore;

#[cfg(feature = "redis-backend")]
pub use redis::RedisMessageStore;
