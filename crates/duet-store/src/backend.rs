use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;

/// Raw key-value operations the cache store is built on.
///
/// Implementations must be internally thread-safe: callers reach them from
/// several threads without any outer lock. TTLs are "at least this long";
/// exact expiry timing is up to the backend.
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and stats.
    fn name(&self) -> &'static str;

    /// Whether data lives outside this process.
    fn is_external(&self) -> bool;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Append `item` to the list at `key`, keep only the newest `capacity`
    /// items, and reset the list's TTL. Must be atomic per key.
    fn push_capped(
        &self,
        key: &str,
        item: &str,
        capacity: usize,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Items of the list at `key`, oldest first. Empty when absent.
    fn list(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Delete every key starting with `prefix`. Returns the number deleted.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Approximate number of live keys starting with `prefix`.
    fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError>;
}

impl<B: CacheBackend + ?Sized> CacheBackend for Arc<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn is_external(&self) -> bool {
        (**self).is_external()
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn push_capped(
        &self,
        key: &str,
        item: &str,
        capacity: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        (**self).push_capped(key, item, capacity, ttl)
    }

    fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(key)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        (**self).delete_prefix(prefix)
    }

    fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        (**self).count_prefix(prefix)
    }
}
