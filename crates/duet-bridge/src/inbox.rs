use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use duet_memory::UnifiedMemory;
use duet_models::schema::ACTIVE_SIGNALS_CAPACITY;
use duet_models::{CrossFrameworkEvent, ErrorKind, Framework, Placement, TradingSignalRecord};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::BridgeError;

/// Remembered signal ids. Larger than the active list so an id cannot be
/// forgotten while it is still listed.
const SEEN_CAPACITY: usize = ACTIVE_SIGNALS_CAPACITY * 2;

/// Result of one [`SignalInbox::drain_events`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub handled: usize,
    pub failed: usize,
}

/// Consumer-side view for one framework: new signals from the cache and
/// pending events from the durable relay.
pub struct SignalInbox {
    memory: Arc<UnifiedMemory>,
    framework: Framework,
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl SignalInbox {
    pub fn new(memory: Arc<UnifiedMemory>, framework: Framework) -> Self {
        Self {
            memory,
            framework,
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub fn framework(&self) -> Framework {
        self.framework
    }

    /// Active signals not returned by an earlier poll, oldest first.
    ///
    /// Ids whose entry expired or cannot be decoded are skipped and not
    /// retried. A failed lookup leaves its id for the next poll and does not
    /// hold back the rest of the list.
    pub fn poll(&mut self) -> Result<Vec<TradingSignalRecord>, BridgeError> {
        let mut fresh = Vec::new();
        for signal_id in self.memory.get_active_signals()? {
            if self.seen.contains(&signal_id) {
                continue;
            }
            match self.memory.get_trading_signal(&signal_id, Placement::Cache) {
                Ok(Some(signal)) => fresh.push(signal),
                Ok(None) => debug!(signal = %signal_id, "Active signal already expired"),
                Err(e) if e.kind() == ErrorKind::Malformed => {
                    warn!(signal = %signal_id, error = %e, "Dropping undecodable signal");
                }
                Err(e) => {
                    warn!(
                        signal = %signal_id,
                        error = %e,
                        "Signal lookup failed, retrying next poll"
                    );
                    continue;
                }
            }
            self.remember(signal_id);
        }
        Ok(fresh)
    }

    fn remember(&mut self, signal_id: String) {
        if self.seen.insert(signal_id.clone()) {
            self.order.push_back(signal_id);
        }
        while self.order.len() > SEEN_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
    }

    /// Hand every durable unprocessed event addressed to this framework (or
    /// broadcast) to `handler`, oldest first. Only events the handler
    /// accepts are marked processed; the rest stay pending for the next call.
    pub fn drain_events<F>(&self, mut handler: F) -> Result<DrainReport, BridgeError>
    where
        F: FnMut(&CrossFrameworkEvent) -> anyhow::Result<()>,
    {
        let mut report = DrainReport::default();
        for event in self.memory.get_unprocessed_events(Some(self.framework))? {
            match handler(&event) {
                Ok(()) => {
                    self.memory.mark_event_processed(&event.id)?;
                    report.handled += 1;
                }
                Err(e) => {
                    warn!(
                        framework = %self.framework,
                        event = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "Event handler failed, left pending"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_models::schema::{key_patterns, ACTIVE_SIGNALS_TTL_SECONDS};
    use duet_models::{MemoryConfig, SignalPayload};
    use duet_store::{CacheBackend, CacheStore, MemoryBackend, PersistentStore, StoreError};
    use serde_json::Map;
    use std::sync::Mutex;
    use std::time::Duration;

    fn memory() -> Arc<UnifiedMemory> {
        Arc::new(UnifiedMemory::in_memory(MemoryConfig::default()).unwrap())
    }

    /// In-process backend whose reads of chosen keys fail as unavailable.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        failing: Mutex<HashSet<String>>,
    }

    impl FlakyBackend {
        fn fail(&self, key: String) {
            self.failing.lock().unwrap().insert(key);
        }

        fn recover(&self) {
            self.failing.lock().unwrap().clear();
        }
    }

    impl CacheBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn is_external(&self) -> bool {
            false
        }

        fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl)
        }

        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.failing.lock().unwrap().contains(key) {
                return Err(StoreError::Unavailable(format!("{key} timed out")));
            }
            self.inner.get(key)
        }

        fn push_capped(
            &self,
            key: &str,
            item: &str,
            capacity: usize,
            ttl: Duration,
        ) -> Result<(), StoreError> {
            self.inner.push_capped(key, item, capacity, ttl)
        }

        fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list(key)
        }

        fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
            self.inner.delete_prefix(prefix)
        }

        fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
            self.inner.count_prefix(prefix)
        }
    }

    fn flaky_memory() -> (Arc<UnifiedMemory>, Arc<FlakyBackend>, String) {
        let config = MemoryConfig::default();
        let ns = config.namespace.clone();
        let backend = Arc::new(FlakyBackend::default());
        let cache = CacheStore::with_backend(Box::new(Arc::clone(&backend)), ns.clone());
        let memory = UnifiedMemory::with_stores(
            config,
            Arc::new(PersistentStore::open_in_memory().unwrap()),
            Arc::new(cache),
        )
        .unwrap();
        (Arc::new(memory), backend, ns)
    }

    fn save_signal(memory: &UnifiedMemory, signal_id: &str) {
        memory
            .save_trading_signal(
                signal_id,
                SignalPayload::new("buy"),
                Framework::Agent,
                Placement::Cache,
            )
            .unwrap();
    }

    fn ids(signals: Vec<TradingSignalRecord>) -> Vec<String> {
        signals.into_iter().map(|s| s.signal_id).collect()
    }

    #[test]
    fn each_signal_is_delivered_once() {
        let memory = memory();
        let mut inbox = SignalInbox::new(Arc::clone(&memory), Framework::Trading);
        assert!(inbox.poll().unwrap().is_empty());

        memory
            .save_trading_signal(
                "s1",
                SignalPayload::new("buy"),
                Framework::Agent,
                Placement::Cache,
            )
            .unwrap();
        memory
            .save_trading_signal(
                "s2",
                SignalPayload::new("sell"),
                Framework::Agent,
                Placement::Cache,
            )
            .unwrap();

        let first: Vec<_> = inbox.poll().unwrap().into_iter().map(|s| s.signal_id).collect();
        assert_eq!(first, vec!["s1", "s2"]);
        assert!(inbox.poll().unwrap().is_empty());

        memory
            .save_trading_signal(
                "s3",
                SignalPayload::new("buy"),
                Framework::Agent,
                Placement::Cache,
            )
            .unwrap();
        let second: Vec<_> = inbox.poll().unwrap().into_iter().map(|s| s.signal_id).collect();
        assert_eq!(second, vec!["s3"]);
    }

    #[test]
    fn seen_set_is_bounded() {
        let mut inbox = SignalInbox::new(memory(), Framework::Trading);
        for i in 0..SEEN_CAPACITY + 10 {
            inbox.remember(format!("s{i}"));
        }
        assert_eq!(inbox.seen.len(), SEEN_CAPACITY);
        assert!(!inbox.seen.contains("s0"));
        assert!(inbox.seen.contains(&format!("s{}", SEEN_CAPACITY + 9)));
    }

    #[test]
    fn drain_marks_only_handled_events() {
        let memory = memory();
        let inbox = SignalInbox::new(Arc::clone(&memory), Framework::Trading);
        memory
            .publish_event("good", Map::new(), Framework::Agent, Some(Framework::Trading))
            .unwrap();
        memory
            .publish_event("bad", Map::new(), Framework::Agent, Some(Framework::Trading))
            .unwrap();
        memory
            .publish_event("elsewhere", Map::new(), Framework::Trading, Some(Framework::Agent))
            .unwrap();

        let report = inbox
            .drain_events(|event| {
                if event.event_type == "bad" {
                    anyhow::bail!("cannot handle");
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(report, DrainReport { handled: 1, failed: 1 });

        let pending = memory.get_unprocessed_events(Some(Framework::Trading)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "bad");

        // the agent's event is untouched
        assert_eq!(memory.get_unprocessed_events(Some(Framework::Agent)).unwrap().len(), 1);
    }

    #[test]
    fn corrupt_signal_does_not_block_the_rest() {
        let (memory, backend, ns) = flaky_memory();
        let mut inbox = SignalInbox::new(Arc::clone(&memory), Framework::Trading);

        save_signal(&memory, "good-1");
        let ttl = Duration::from_secs(ACTIVE_SIGNALS_TTL_SECONDS);
        backend
            .set(&key_patterns::trading_signal(&ns, "bad"), "not json", ttl)
            .unwrap();
        backend
            .push_capped(&key_patterns::active_signals(&ns), "bad", ACTIVE_SIGNALS_CAPACITY, ttl)
            .unwrap();
        save_signal(&memory, "good-2");

        assert_eq!(ids(inbox.poll().unwrap()), vec!["good-1", "good-2"]);
        assert!(inbox.poll().unwrap().is_empty());
    }

    #[test]
    fn failed_lookup_is_retried_without_losing_others() {
        let (memory, backend, ns) = flaky_memory();
        let mut inbox = SignalInbox::new(Arc::clone(&memory), Framework::Trading);

        save_signal(&memory, "s1");
        save_signal(&memory, "s2");
        save_signal(&memory, "s3");
        backend.fail(key_patterns::trading_signal(&ns, "s2"));

        assert_eq!(ids(inbox.poll().unwrap()), vec!["s1", "s3"]);

        backend.recover();
        assert_eq!(ids(inbox.poll().unwrap()), vec!["s2"]);
        assert!(inbox.poll().unwrap().is_empty());
    }
}
