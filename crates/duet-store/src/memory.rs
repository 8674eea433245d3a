use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;

use crate::backend::CacheBackend;
use crate::error::StoreError;

#[derive(Clone)]
enum Slot {
    Value(Arc<str>),
    List(Arc<Vec<String>>),
}

#[derive(Clone)]
struct Entry {
    slot: Slot,
    ttl: Duration,
}

/// Expire each entry after its own TTL, reset on overwrite.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by moka.
///
/// Used when no external cache is configured or reachable. Data does not
/// survive a restart and is not shared with other processes.
pub struct MemoryBackend {
    inner: Cache<String, Entry>,
    // Serialises read-modify-write on lists.
    list_lock: Mutex<()>,
}

impl MemoryBackend {
    /// `capacity_hint` pre-sizes the cache; it is not an eviction limit.
    pub fn new(capacity_hint: u64) -> Self {
        Self {
            inner: Cache::builder()
                .initial_capacity(usize::try_from(capacity_hint).unwrap_or(usize::MAX).min(1 << 20))
                .expire_after(PerEntryTtl)
                .build(),
            list_lock: Mutex::new(()),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_external(&self) -> bool {
        false
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.insert(
            key.to_string(),
            Entry {
                slot: Slot::Value(Arc::from(value)),
                ttl,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.inner.get(key) {
            Some(Entry {
                slot: Slot::Value(value),
                ..
            }) => Ok(Some(value.to_string())),
            Some(_) => Err(StoreError::Malformed(format!("{key} holds a list"))),
            None => Ok(None),
        }
    }

    fn push_capped(
        &self,
        key: &str,
        item: &str,
        capacity: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let _guard = self
            .list_lock
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("cache list lock poisoned: {e}")))?;

        let mut items = match self.inner.get(key) {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => items.as_ref().clone(),
            _ => Vec::new(),
        };
        items.push(item.to_string());
        if items.len() > capacity {
            items.drain(..items.len() - capacity);
        }

        self.inner.insert(
            key.to_string(),
            Entry {
                slot: Slot::List(Arc::new(items)),
                ttl,
            },
        );
        Ok(())
    }

    fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.inner.get(key) {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => Ok(items.as_ref().clone()),
            Some(_) => Err(StoreError::Malformed(format!("{key} is not a list"))),
            None => Ok(Vec::new()),
        }
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let keys = self.keys_with_prefix(prefix);
        for key in &keys {
            self.inner.invalidate(key);
        }
        Ok(keys.len())
    }

    fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        Ok(self.keys_with_prefix(prefix).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn set_and_get() {
        let cache = MemoryBackend::new(100);
        cache.set("key1", "value1", MINUTE).unwrap();
        assert_eq!(cache.get("key1").unwrap(), Some("value1".to_string()));
        assert_eq!(cache.get("missing").unwrap(), None);
    }

    #[test]
    fn ttl_expiration() {
        let cache = MemoryBackend::new(100);
        cache.set("short", "v", Duration::from_millis(50)).unwrap();
        cache.set("long", "v", MINUTE).unwrap();

        // Should exist immediately
        assert!(cache.get("short").unwrap().is_some());

        std::thread::sleep(Duration::from_millis(100));

        assert!(cache.get("short").unwrap().is_none());
        assert!(cache.get("long").unwrap().is_some());
    }

    #[test]
    fn overwrite_resets_ttl() {
        let cache = MemoryBackend::new(100);
        cache.set("key", "old", Duration::from_millis(50)).unwrap();
        cache.set("key", "new", MINUTE).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(cache.get("key").unwrap(), Some("new".to_string()));
    }

    #[test]
    fn push_capped_keeps_newest() {
        let cache = MemoryBackend::new(100);
        for i in 0..7 {
            cache.push_capped("list", &i.to_string(), 5, MINUTE).unwrap();
        }
        assert_eq!(cache.list("list").unwrap(), vec!["2", "3", "4", "5", "6"]);
        assert!(cache.list("absent").unwrap().is_empty());
    }

    #[test]
    fn type_mismatch_is_malformed() {
        let cache = MemoryBackend::new(100);
        cache.push_capped("list", "a", 5, MINUTE).unwrap();
        assert!(matches!(cache.get("list"), Err(StoreError::Malformed(_))));
        cache.set("value", "a", MINUTE).unwrap();
        assert!(matches!(cache.list("value"), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn delete_and_count_by_prefix() {
        let cache = MemoryBackend::new(100);
        cache.set("ns:market:a", "1", MINUTE).unwrap();
        cache.set("ns:market:b", "1", MINUTE).unwrap();
        cache.set("ns:state:c", "1", MINUTE).unwrap();
        cache.set("other:market:a", "1", MINUTE).unwrap();

        assert_eq!(cache.count_prefix("ns:").unwrap(), 3);
        assert_eq!(cache.delete_prefix("ns:market:").unwrap(), 2);
        assert!(cache.get("ns:market:a").unwrap().is_none());
        assert!(cache.get("ns:state:c").unwrap().is_some());
        assert!(cache.get("other:market:a").unwrap().is_some());
    }

    #[test]
    fn concurrent_pushes_are_not_lost() {
        let cache = Arc::new(MemoryBackend::new(100));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        cache
                            .push_capped("list", &format!("{t}-{i}"), 1000, MINUTE)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.list("list").unwrap().len(), 80);
    }
}
