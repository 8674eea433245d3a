pub mod backend;
pub mod cache;
pub mod error;
pub mod memory;
pub mod redis_backend;
pub mod sqlite;

pub use backend::CacheBackend;
pub use cache::CacheStore;
pub use error::StoreError;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use sqlite::{CleanupReport, PersistentStore};
