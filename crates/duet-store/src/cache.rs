use std::time::Duration;

use duet_models::schema::{
    key_patterns, ACTIVE_SIGNALS_CAPACITY, ACTIVE_SIGNALS_TTL_SECONDS, EVENT_QUEUE_CAPACITY,
    EVENT_QUEUE_TTL_SECONDS, EVENT_TTL_SECONDS,
};
use duet_models::{
    AgentDecisionRecord, CrossFrameworkEvent, Framework, MarketDataRecord, RedisConfig,
    SystemStateRecord, TradingSignalRecord,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::backend::CacheBackend;
use crate::error::StoreError;
use crate::memory::MemoryBackend;
use crate::redis_backend::RedisBackend;

/// Namespaced, TTL-bound key-value store for "latest value" lookups and
/// short-lived event queues.
///
/// Market data and agent decisions are written twice: the direct entry and a
/// "latest" pointer whose value is the direct entry's key, both under the same
/// TTL. A read without a sub-key follows the pointer. A pointer whose target
/// has already expired reads as a miss.
pub struct CacheStore {
    backend: Box<dyn CacheBackend>,
    namespace: String,
}

impl CacheStore {
    /// Connect to Redis, falling back to the in-process cache if it is
    /// disabled or unreachable. Never fails.
    pub fn connect(config: &RedisConfig, namespace: impl Into<String>, capacity_hint: u64) -> Self {
        let namespace = namespace.into();
        if !config.enabled {
            info!(namespace = %namespace, "Redis disabled, using in-process cache");
            return Self::with_backend(Box::new(MemoryBackend::new(capacity_hint)), namespace);
        }

        match RedisBackend::connect(config) {
            Ok(backend) => Self::with_backend(Box::new(backend), namespace),
            Err(e) => {
                warn!(
                    error = %e,
                    host = %config.host,
                    port = config.port,
                    "Redis unavailable, falling back to in-process cache"
                );
                Self::with_backend(Box::new(MemoryBackend::new(capacity_hint)), namespace)
            }
        }
    }

    pub fn in_memory(namespace: impl Into<String>) -> Self {
        Self::with_backend(Box::new(MemoryBackend::default()), namespace)
    }

    pub fn with_backend(backend: Box<dyn CacheBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_external(&self) -> bool {
        self.backend.is_external()
    }

    fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.backend.set(key, &json, ttl)
    }

    fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.backend.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Resolve a latest pointer, then fetch its target.
    fn follow<T: DeserializeOwned>(&self, pointer: &str) -> Result<Option<T>, StoreError> {
        match self.backend.get(pointer)? {
            Some(target) => self.fetch(&target),
            None => Ok(None),
        }
    }

    // ---- market data ----

    pub fn set_market_data(
        &self,
        record: &MarketDataRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ns = &self.namespace;
        let key = key_patterns::market_data(ns, &record.instrument_id, &record.data_type);
        self.put(&key, record, ttl)?;
        self.backend.set(
            &key_patterns::latest_market_data(ns, &record.instrument_id),
            &key,
            ttl,
        )?;
        debug!(key = %key, "Market data cached");
        Ok(())
    }

    /// Direct lookup when `data_type` is given, else the latest of any type.
    pub fn get_market_data(
        &self,
        instrument_id: &str,
        data_type: Option<&str>,
    ) -> Result<Option<MarketDataRecord>, StoreError> {
        let ns = &self.namespace;
        match data_type {
            Some(data_type) => self.fetch(&key_patterns::market_data(ns, instrument_id, data_type)),
            None => self.follow(&key_patterns::latest_market_data(ns, instrument_id)),
        }
    }

    // ---- agent decisions ----

    pub fn set_agent_decision(
        &self,
        record: &AgentDecisionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ns = &self.namespace;
        let key = key_patterns::agent_decision(ns, &record.agent_id, &record.decision_type);
        self.put(&key, record, ttl)?;
        self.backend.set(
            &key_patterns::latest_agent_decision(ns, &record.agent_id),
            &key,
            ttl,
        )?;
        debug!(key = %key, "Agent decision cached");
        Ok(())
    }

    pub fn get_agent_decision(
        &self,
        agent_id: &str,
        decision_type: Option<&str>,
    ) -> Result<Option<AgentDecisionRecord>, StoreError> {
        let ns = &self.namespace;
        match decision_type {
            Some(decision_type) => {
                self.fetch(&key_patterns::agent_decision(ns, agent_id, decision_type))
            }
            None => self.follow(&key_patterns::latest_agent_decision(ns, agent_id)),
        }
    }

    // ---- trading signals ----

    /// Cache the signal and append its id to the capped active-signals list.
    pub fn set_trading_signal(
        &self,
        record: &TradingSignalRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ns = &self.namespace;
        self.put(&key_patterns::trading_signal(ns, &record.signal_id), record, ttl)?;
        self.backend.push_capped(
            &key_patterns::active_signals(ns),
            &record.signal_id,
            ACTIVE_SIGNALS_CAPACITY,
            Duration::from_secs(ACTIVE_SIGNALS_TTL_SECONDS),
        )
    }

    pub fn get_trading_signal(
        &self,
        signal_id: &str,
    ) -> Result<Option<TradingSignalRecord>, StoreError> {
        self.fetch(&key_patterns::trading_signal(&self.namespace, signal_id))
    }

    /// Recent signal ids, oldest first. Individual signals may have expired.
    pub fn get_active_signals(&self) -> Result<Vec<String>, StoreError> {
        self.backend.list(&key_patterns::active_signals(&self.namespace))
    }

    // ---- system state ----

    pub fn set_system_state(
        &self,
        record: &SystemStateRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.put(
            &key_patterns::system_state(&self.namespace, &record.component),
            record,
            ttl,
        )
    }

    pub fn get_system_state(
        &self,
        component: &str,
    ) -> Result<Option<SystemStateRecord>, StoreError> {
        self.fetch(&key_patterns::system_state(&self.namespace, component))
    }

    // ---- events ----

    /// Build an event, cache it and queue its id. Returns the id.
    pub fn publish(
        &self,
        event_type: &str,
        data: Map<String, Value>,
        source: Framework,
        target: Option<Framework>,
    ) -> Result<String, StoreError> {
        let event = CrossFrameworkEvent::new(event_type, source, data, target);
        self.publish_event(&event)?;
        Ok(event.id)
    }

    /// Cache an already-built event and append its id to the target's queue
    /// (`all` for broadcasts), keeping the newest ids only.
    pub fn publish_event(&self, event: &CrossFrameworkEvent) -> Result<(), StoreError> {
        let ns = &self.namespace;
        self.put(
            &key_patterns::event(ns, &event.id),
            event,
            Duration::from_secs(EVENT_TTL_SECONDS),
        )?;
        self.backend.push_capped(
            &key_patterns::event_queue(ns, event.target_framework.map(Framework::as_str)),
            &event.id,
            EVENT_QUEUE_CAPACITY,
            Duration::from_secs(EVENT_QUEUE_TTL_SECONDS),
        )?;
        debug!(id = %event.id, event_type = %event.event_type, "Event published to cache");
        Ok(())
    }

    /// Event ids queued for `target` (`None` is the broadcast queue), oldest first.
    pub fn get_event_queue(&self, target: Option<Framework>) -> Result<Vec<String>, StoreError> {
        self.backend.list(&key_patterns::event_queue(
            &self.namespace,
            target.map(Framework::as_str),
        ))
    }

    pub fn get_event(&self, event_id: &str) -> Result<Option<CrossFrameworkEvent>, StoreError> {
        self.fetch(&key_patterns::event(&self.namespace, event_id))
    }

    // ---- maintenance ----

    /// Delete everything in the namespace, or one category of it.
    pub fn clear_namespace(&self, category: Option<&str>) -> Result<usize, StoreError> {
        let prefix = key_patterns::namespace_prefix(&self.namespace, category);
        let deleted = self.backend.delete_prefix(&prefix)?;
        info!(prefix = %prefix, deleted, "Cache namespace cleared");
        Ok(deleted)
    }

    /// Approximate number of live keys in the namespace.
    pub fn entry_count(&self) -> Result<u64, StoreError> {
        self.backend
            .count_prefix(&key_patterns::namespace_prefix(&self.namespace, None))
    }
}
