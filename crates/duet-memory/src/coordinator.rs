use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use duet_models::payload::{from_map, to_map};
use duet_models::{
    ids, AgentDecisionRecord, CrossFrameworkEvent, DecisionPayload, DuetConfig, ErrorKind,
    Framework, MarketDataPayload, MarketDataRecord, MemoryConfig, MemoryEvent, MemoryQuery,
    Placement, SharedMemoryEntry, SignalPayload, SystemStateRecord, TradingSignalRecord,
};
use duet_store::{CacheStore, CleanupReport, PersistentStore};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::callbacks::{CallbackRegistry, MemoryCallback};
use crate::cleanup::{self, cleanup_loop};
use crate::error::MemoryError;
use crate::stats::{CacheStats, MemoryStats, PersistentStats};

/// How long `stop()` waits for the cleanup task before giving up on it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const MARKET_DATA_PREFIX: &str = "market_data_";
const AGENT_DECISION_PREFIX: &str = "agent_decision_";
const TRADING_SIGNAL_TYPE: &str = "trading_signal";

/// What `clear_all` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub cache_keys: usize,
    pub rows: usize,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Facade over the persistent and cache stores.
///
/// Writes with `Placement::Both` attempt both stores even if the first
/// fails, then fire callbacks, then return the first error. There is no
/// two-phase commit: a failure between the two writes leaves them
/// inconsistent.
pub struct UnifiedMemory {
    config: MemoryConfig,
    persistent: Arc<PersistentStore>,
    cache: Arc<CacheStore>,
    callbacks: CallbackRegistry,
    worker: Mutex<Option<Worker>>,
    running: AtomicBool,
}

impl UnifiedMemory {
    /// Validate the configuration, open the database file and connect the
    /// cache (falling back to the in-process cache if Redis is unavailable).
    pub fn new(config: &DuetConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        let persistent = PersistentStore::open(&config.memory.sqlite_path)?;
        let cache = CacheStore::connect(
            &config.redis,
            config.memory.namespace.clone(),
            config.memory.max_cache_size,
        );
        Self::with_stores(config.memory.clone(), Arc::new(persistent), Arc::new(cache))
    }

    /// In-memory SQLite and in-process cache. Useful for testing.
    pub fn in_memory(config: MemoryConfig) -> Result<Self, MemoryError> {
        let persistent = PersistentStore::open_in_memory()?;
        let cache = CacheStore::in_memory(config.namespace.clone());
        Self::with_stores(config, Arc::new(persistent), Arc::new(cache))
    }

    pub fn with_stores(
        config: MemoryConfig,
        persistent: Arc<PersistentStore>,
        cache: Arc<CacheStore>,
    ) -> Result<Self, MemoryError> {
        config.validate()?;
        info!(
            namespace = %config.namespace,
            cache_backend = cache.backend_name(),
            "Unified memory initialised"
        );
        Ok(Self {
            config,
            persistent,
            cache,
            callbacks: CallbackRegistry::new(),
            worker: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn persistent(&self) -> &Arc<PersistentStore> {
        &self.persistent
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    // ---- lifecycle ----

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stopped -> Running. Spawns the cleanup task unless the interval is 0.
    /// A no-op when already running. Must be called inside a Tokio runtime.
    pub fn start(&self) -> Result<(), MemoryError> {
        let mut worker = self.lock_worker();
        if self.running.load(Ordering::SeqCst) {
            debug!("Unified memory already running");
            return Ok(());
        }

        if let Some(interval) = self.config.cleanup_interval() {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| MemoryError::NoRuntime(e.to_string()))?;
            let cancel = CancellationToken::new();
            let handle = runtime.spawn(cleanup_loop(
                Arc::clone(&self.persistent),
                self.config.days_to_keep,
                interval,
                self.config.enable_async,
                cancel.clone(),
            ));
            *worker = Some(Worker { cancel, handle });
        }

        self.running.store(true, Ordering::SeqCst);
        info!(
            cleanup_interval_seconds = self.config.cleanup_interval_seconds,
            days_to_keep = self.config.days_to_keep,
            "Unified memory started"
        );
        Ok(())
    }

    /// Running -> Stopped. Cancels the cleanup task and waits for it at most
    /// five seconds; returns either way. A no-op when already stopped.
    pub async fn stop(&self) {
        let worker = self.lock_worker().take();
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(worker) = worker {
            worker.cancel.cancel();
            match tokio::time::timeout(STOP_TIMEOUT, worker.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Cleanup task ended abnormally"),
                Err(_) => warn!(
                    timeout_seconds = STOP_TIMEOUT.as_secs(),
                    "Cleanup task did not stop in time"
                ),
            }
        }
        info!("Unified memory stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ---- callbacks ----

    /// Register `handler` for an event name such as
    /// [`MemoryEvent::AGENT_DECISION_SAVED`]. Registering the same handle
    /// twice is a no-op.
    pub fn register_callback(&self, event: &str, handler: MemoryCallback) -> bool {
        self.callbacks.register(event, handler)
    }

    /// Unregistering an unknown handle is a no-op.
    pub fn unregister_callback(&self, event: &str, handler: &MemoryCallback) -> bool {
        self.callbacks.unregister(event, handler)
    }

    // ---- market data ----

    /// Returns the record id.
    pub fn save_market_data(
        &self,
        instrument_id: &str,
        data_type: &str,
        data: MarketDataPayload,
        source: Framework,
        placement: Placement,
    ) -> Result<String, MemoryError> {
        require_key("instrument_id", instrument_id)?;
        require_key("data_type", data_type)?;

        let record = MarketDataRecord::new(instrument_id, data_type, data);
        let mut outcome = Outcome::new("market data");

        if placement.uses_persistent() {
            outcome.record("persistent", self.persist_market_data(&record, source));
        }
        if placement.uses_cache() {
            outcome.record(
                "cache",
                self.cache
                    .set_market_data(&record, self.config.market_data_ttl())
                    .map_err(MemoryError::from),
            );
        }

        self.callbacks.dispatch(&MemoryEvent::MarketDataSaved {
            instrument_id: record.instrument_id.clone(),
            data_type: record.data_type.clone(),
            source,
            placement,
        });
        outcome.finish(record.id)
    }

    fn persist_market_data(
        &self,
        record: &MarketDataRecord,
        source: Framework,
    ) -> Result<(), MemoryError> {
        self.persistent.save_market_data(record)?;
        let entry = SharedMemoryEntry::new(
            source,
            format!("{MARKET_DATA_PREFIX}{}", record.data_type),
        )
        .with_content(to_map(&record.data)?)
        .with_metadata("instrument_id", record.instrument_id.as_str())
        .with_metadata("data_type", record.data_type.as_str())
        .with_tags([
            "market_data",
            record.instrument_id.as_str(),
            record.data_type.as_str(),
        ])
        .at(record.timestamp);
        self.persistent.save_shared_memory(&entry)?;
        Ok(())
    }

    pub fn get_market_data(
        &self,
        instrument_id: &str,
        data_type: Option<&str>,
        placement: Placement,
    ) -> Result<Option<MarketDataRecord>, MemoryError> {
        read_through(
            placement,
            "market data",
            || self.cache.get_market_data(instrument_id, data_type),
            || {
                Ok(self
                    .persistent
                    .get_market_data(instrument_id, data_type, 1)?
                    .into_iter()
                    .next())
            },
        )
    }

    /// Durable history, most recent first.
    pub fn get_market_data_history(
        &self,
        instrument_id: &str,
        data_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MarketDataRecord>, MemoryError> {
        Ok(self.persistent.get_market_data(instrument_id, data_type, limit)?)
    }

    // ---- agent decisions ----

    /// Returns the record id.
    #[allow(clippy::too_many_arguments)]
    pub fn save_agent_decision(
        &self,
        agent_id: &str,
        decision_type: &str,
        data: DecisionPayload,
        confidence: f64,
        task_id: Option<&str>,
        source: Framework,
        placement: Placement,
    ) -> Result<String, MemoryError> {
        require_key("agent_id", agent_id)?;
        require_key("decision_type", decision_type)?;
        require_confidence(confidence)?;

        let mut record = AgentDecisionRecord::new(agent_id, decision_type, data, confidence);
        if let Some(task_id) = task_id {
            record = record.with_task(task_id);
        }
        self.store_agent_decision(&record, source, placement)?;
        Ok(record.id)
    }

    fn store_agent_decision(
        &self,
        record: &AgentDecisionRecord,
        source: Framework,
        placement: Placement,
    ) -> Result<(), MemoryError> {
        let mut outcome = Outcome::new("agent decision");

        if placement.uses_persistent() {
            outcome.record("persistent", self.persist_agent_decision(record, source));
        }
        if placement.uses_cache() {
            outcome.record(
                "cache",
                self.cache
                    .set_agent_decision(record, self.config.agent_decision_ttl())
                    .map_err(MemoryError::from),
            );
        }

        self.callbacks.dispatch(&MemoryEvent::AgentDecisionSaved {
            agent_id: record.agent_id.clone(),
            decision_type: record.decision_type.clone(),
            confidence: record.confidence,
            source,
            placement,
        });
        outcome.finish(())
    }

    fn persist_agent_decision(
        &self,
        record: &AgentDecisionRecord,
        source: Framework,
    ) -> Result<(), MemoryError> {
        self.persistent.save_agent_decision(record)?;
        let entry = SharedMemoryEntry::new(
            source,
            format!("{AGENT_DECISION_PREFIX}{}", record.decision_type),
        )
        .with_content(to_map(&record.data)?)
        .with_metadata("agent_id", record.agent_id.as_str())
        .with_metadata("decision_type", record.decision_type.as_str())
        .with_metadata("confidence", record.confidence)
        .with_metadata("task_id", record.task_id.clone())
        .with_score(record.confidence)
        .with_tags([
            "agent_decision",
            record.agent_id.as_str(),
            record.decision_type.as_str(),
        ])
        .at(record.timestamp);
        self.persistent.save_shared_memory(&entry)?;
        Ok(())
    }

    pub fn get_agent_decision(
        &self,
        agent_id: &str,
        decision_type: Option<&str>,
        placement: Placement,
    ) -> Result<Option<AgentDecisionRecord>, MemoryError> {
        read_through(
            placement,
            "agent decision",
            || self.cache.get_agent_decision(agent_id, decision_type),
            || {
                Ok(self
                    .persistent
                    .get_agent_decisions(agent_id, decision_type, 1)?
                    .into_iter()
                    .next())
            },
        )
    }

    /// Durable history, most recent first.
    pub fn get_agent_decision_history(
        &self,
        agent_id: &str,
        decision_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentDecisionRecord>, MemoryError> {
        Ok(self.persistent.get_agent_decisions(agent_id, decision_type, limit)?)
    }

    // ---- trading signals ----

    /// Persistent placement stores the signal as a shared-memory entry whose
    /// id is `signal_id`; saving the same id again replaces it.
    pub fn save_trading_signal(
        &self,
        signal_id: &str,
        data: SignalPayload,
        source: Framework,
        placement: Placement,
    ) -> Result<(), MemoryError> {
        require_key("signal_id", signal_id)?;
        if let Some(confidence) = data.confidence {
            require_confidence(confidence)?;
        }

        let record = TradingSignalRecord::new(signal_id, source, data);
        let mut outcome = Outcome::new("trading signal");

        if placement.uses_persistent() {
            outcome.record("persistent", self.persist_trading_signal(&record));
        }
        if placement.uses_cache() {
            outcome.record(
                "cache",
                self.cache
                    .set_trading_signal(&record, self.config.trading_signal_ttl())
                    .map_err(MemoryError::from),
            );
        }

        self.callbacks.dispatch(&MemoryEvent::TradingSignalSaved {
            signal_id: record.signal_id.clone(),
            action: record.data.action.clone(),
            source,
            placement,
        });
        outcome.finish(())
    }

    fn persist_trading_signal(&self, record: &TradingSignalRecord) -> Result<(), MemoryError> {
        let entry = SharedMemoryEntry::new(record.source, TRADING_SIGNAL_TYPE)
            .with_id(record.signal_id.as_str())
            .with_content(to_map(&record.data)?)
            .with_metadata("signal_id", record.signal_id.as_str())
            .with_score(record.data.confidence.unwrap_or(0.0))
            .with_tags([TRADING_SIGNAL_TYPE, record.data.action.as_str()])
            .at(record.timestamp);
        self.persistent.save_shared_memory(&entry)?;
        Ok(())
    }

    pub fn get_trading_signal(
        &self,
        signal_id: &str,
        placement: Placement,
    ) -> Result<Option<TradingSignalRecord>, MemoryError> {
        read_through(
            placement,
            "trading signal",
            || self.cache.get_trading_signal(signal_id),
            || {
                let Some(entry) = self.persistent.load_shared_memory(signal_id)? else {
                    return Ok(None);
                };
                if entry.data_type != TRADING_SIGNAL_TYPE {
                    return Ok(None);
                }
                Ok(Some(TradingSignalRecord {
                    signal_id: signal_id.to_string(),
                    source: entry.source,
                    data: from_map(&entry.content)?,
                    timestamp: entry.timestamp,
                }))
            },
        )
    }

    /// Recent signal ids, oldest first. Each may have expired since.
    pub fn get_active_signals(&self) -> Result<Vec<String>, MemoryError> {
        Ok(self.cache.get_active_signals()?)
    }

    // ---- system state ----

    /// Always cache-only.
    pub fn set_system_state(
        &self,
        component: &str,
        state: Map<String, Value>,
        source: Framework,
    ) -> Result<(), MemoryError> {
        require_key("component", component)?;

        let record = SystemStateRecord::new(component, source, state);
        let mut outcome = Outcome::new("system state");
        outcome.record(
            "cache",
            self.cache
                .set_system_state(&record, self.config.system_state_ttl())
                .map_err(MemoryError::from),
        );

        self.callbacks.dispatch(&MemoryEvent::SystemStateUpdated {
            component: record.component.clone(),
            source,
        });
        outcome.finish(())
    }

    pub fn get_system_state(
        &self,
        component: &str,
    ) -> Result<Option<SystemStateRecord>, MemoryError> {
        Ok(self.cache.get_system_state(component)?)
    }

    // ---- shared memory ----

    /// Write a generic entry. Cache placement also projects `market_data_*`
    /// and `agent_decision_*` entries into the matching cache keys so the
    /// entity getters see them. Returns the entry id.
    pub fn save_shared_memory(
        &self,
        mut entry: SharedMemoryEntry,
        placement: Placement,
    ) -> Result<String, MemoryError> {
        require("data_type", &entry.data_type)?;
        let id = match entry.id.take() {
            Some(id) if !id.is_empty() => id,
            _ => ids::shared_entry_id(entry.source, &entry.data_type),
        };
        entry.id = Some(id.clone());

        let mut outcome = Outcome::new("shared memory");
        if placement.uses_persistent() {
            outcome.record(
                "persistent",
                self.persistent
                    .save_shared_memory(&entry)
                    .map(drop)
                    .map_err(MemoryError::from),
            );
        }
        if placement.uses_cache() {
            outcome.record("cache", self.project_to_cache(&id, &entry));
        }
        outcome.finish(id)
    }

    fn project_to_cache(&self, id: &str, entry: &SharedMemoryEntry) -> Result<(), MemoryError> {
        if entry.data_type.starts_with(MARKET_DATA_PREFIX) {
            let (Some(instrument_id), Some(data_type)) = (
                entry.metadata_str("instrument_id"),
                entry.metadata_str("data_type"),
            ) else {
                debug!(id, "Market data entry lacks metadata, not cached");
                return Ok(());
            };
            require_key("instrument_id", instrument_id)?;
            require_key("data_type", data_type)?;
            let record = MarketDataRecord {
                id: id.to_string(),
                instrument_id: instrument_id.to_string(),
                data_type: data_type.to_string(),
                data: from_map(&entry.content)?,
                timestamp: entry.timestamp,
            };
            self.cache
                .set_market_data(&record, self.config.market_data_ttl())?;
        } else if entry.data_type.starts_with(AGENT_DECISION_PREFIX) {
            let (Some(agent_id), Some(decision_type)) = (
                entry.metadata_str("agent_id"),
                entry.metadata_str("decision_type"),
            ) else {
                debug!(id, "Agent decision entry lacks metadata, not cached");
                return Ok(());
            };
            require_key("agent_id", agent_id)?;
            require_key("decision_type", decision_type)?;
            let record = AgentDecisionRecord {
                id: id.to_string(),
                agent_id: agent_id.to_string(),
                decision_type: decision_type.to_string(),
                task_id: entry.metadata_str("task_id").map(str::to_string),
                data: from_map(&entry.content)?,
                confidence: entry
                    .metadata
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(entry.score),
                timestamp: entry.timestamp,
            };
            self.cache
                .set_agent_decision(&record, self.config.agent_decision_ttl())?;
        } else {
            debug!(id, data_type = %entry.data_type, "No cache projection for entry type");
        }
        Ok(())
    }

    pub fn load_shared_memory(&self, id: &str) -> Result<Option<SharedMemoryEntry>, MemoryError> {
        Ok(self.persistent.load_shared_memory(id)?)
    }

    pub fn load_shared_memories(
        &self,
        query: &MemoryQuery,
    ) -> Result<Vec<SharedMemoryEntry>, MemoryError> {
        Ok(self.persistent.load_shared_memories(query)?)
    }

    // ---- events ----

    /// Relay an event through both stores under one id: the cache queue for
    /// near-real-time polling, the durable table for replay by a consumer
    /// that was offline. Returns the event id.
    pub fn publish_event(
        &self,
        event_type: &str,
        data: Map<String, Value>,
        source: Framework,
        target: Option<Framework>,
    ) -> Result<String, MemoryError> {
        require("event_type", event_type)?;

        let event = CrossFrameworkEvent::new(event_type, source, data, target);
        let mut outcome = Outcome::new("event");
        outcome.record(
            "cache",
            self.cache.publish_event(&event).map_err(MemoryError::from),
        );
        outcome.record(
            "persistent",
            self.persistent.insert_event(&event).map_err(MemoryError::from),
        );
        debug!(id = %event.id, event_type, target = ?target, "Event published");
        outcome.finish(event.id)
    }

    /// Events still in the cache queue for `target` (`None` is the broadcast
    /// queue), oldest first. Expired or undecodable events are skipped.
    pub fn get_events(
        &self,
        target: Option<Framework>,
    ) -> Result<Vec<CrossFrameworkEvent>, MemoryError> {
        let queued = self.cache.get_event_queue(target)?;
        let mut events = Vec::with_capacity(queued.len());
        for id in queued {
            match self.cache.get_event(&id) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) if e.kind() == ErrorKind::Malformed => {
                    warn!(event = %id, error = %e, "Skipping undecodable queued event");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(events)
    }

    /// Durable unprocessed events for `target` plus broadcasts, oldest first.
    pub fn get_unprocessed_events(
        &self,
        target: Option<Framework>,
    ) -> Result<Vec<CrossFrameworkEvent>, MemoryError> {
        Ok(self.persistent.get_unprocessed_events(target)?)
    }

    /// Idempotent. Returns whether the event exists.
    pub fn mark_event_processed(&self, event_id: &str) -> Result<bool, MemoryError> {
        Ok(self.persistent.mark_event_processed(event_id)?)
    }

    // ---- maintenance ----

    /// One retention sweep with the configured `days_to_keep`.
    pub fn run_cleanup(&self) -> Result<CleanupReport, MemoryError> {
        self.run_cleanup_with(self.config.days_to_keep)
    }

    pub fn run_cleanup_with(&self, days_to_keep: u32) -> Result<CleanupReport, MemoryError> {
        if days_to_keep == 0 {
            return Err(MemoryError::InvalidInput(
                "days_to_keep must be greater than zero".into(),
            ));
        }
        Ok(self.persistent.cleanup_old_data(days_to_keep)?)
    }

    /// Async variant used by the background loop; honours `enable_async`.
    pub async fn run_cleanup_async(&self) -> Result<CleanupReport, MemoryError> {
        cleanup::sweep(
            &self.persistent,
            self.config.days_to_keep,
            self.config.enable_async,
        )
        .await
    }

    pub fn stats(&self) -> Result<MemoryStats, MemoryError> {
        let entries = match self.cache.entry_count() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "Cache entry count unavailable");
                None
            }
        };

        Ok(MemoryStats {
            cache: CacheStats {
                backend: self.cache.backend_name().to_string(),
                external: self.cache.is_external(),
                namespace: self.cache.namespace().to_string(),
                entries,
            },
            persistent: PersistentStats {
                path: self
                    .persistent
                    .path()
                    .map(|p| p.display().to_string()),
                tables: self.persistent.table_counts()?,
                size_bytes: self.persistent.database_size_bytes()?,
            },
            cleanup_interval_seconds: self.config.cleanup_interval_seconds,
            days_to_keep: self.config.days_to_keep,
            running: self.is_running(),
            timestamp: Utc::now(),
        })
    }

    /// Delete the whole cache namespace and every durable row. Irreversible.
    pub fn clear_all(&self) -> Result<ClearReport, MemoryError> {
        let mut outcome = Outcome::new("purge");
        let cache_keys = match self.cache.clear_namespace(None) {
            Ok(n) => n,
            Err(e) => {
                outcome.record("cache", Err(e.into()));
                0
            }
        };
        let rows = match self.persistent.clear_all() {
            Ok(n) => n,
            Err(e) => {
                outcome.record("persistent", Err(e.into()));
                0
            }
        };
        warn!(cache_keys, rows, "All shared memory cleared");
        outcome.finish(ClearReport { cache_keys, rows })
    }
}

impl Drop for UnifiedMemory {
    fn drop(&mut self) {
        if let Some(worker) = self.lock_worker().take() {
            worker.cancel.cancel();
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), MemoryError> {
    if value.trim().is_empty() {
        return Err(MemoryError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Like [`require`], for ids that become part of a cache key.
fn require_key(field: &str, value: &str) -> Result<(), MemoryError> {
    require(field, value)?;
    if value.contains(':') {
        return Err(MemoryError::InvalidInput(format!(
            "{field} must not contain ':', got {value:?}"
        )));
    }
    Ok(())
}

fn require_confidence(confidence: f64) -> Result<(), MemoryError> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(MemoryError::InvalidInput(format!(
            "confidence must be within [0, 1], got {confidence}"
        )));
    }
    Ok(())
}

/// Collects per-store results of a multi-store write; keeps the first error.
struct Outcome {
    what: &'static str,
    first_error: Option<MemoryError>,
}

impl Outcome {
    fn new(what: &'static str) -> Self {
        Self {
            what,
            first_error: None,
        }
    }

    fn record(&mut self, store: &'static str, result: Result<(), MemoryError>) {
        if let Err(e) = result {
            warn!(what = self.what, store, error = %e, "Store write failed");
            self.first_error.get_or_insert(e);
        }
    }

    fn finish<T>(self, value: T) -> Result<T, MemoryError> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }
}

/// Placement-aware read. `Both` falls back to the durable store on a cache
/// miss or a cache error.
fn read_through<T>(
    placement: Placement,
    what: &'static str,
    from_cache: impl FnOnce() -> Result<Option<T>, duet_store::StoreError>,
    from_persistent: impl FnOnce() -> Result<Option<T>, MemoryError>,
) -> Result<Option<T>, MemoryError> {
    match placement {
        Placement::Cache => Ok(from_cache()?),
        Placement::Persistent => from_persistent(),
        Placement::Both => match from_cache() {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => from_persistent(),
            Err(e) => {
                warn!(what, error = %e, "Cache read failed, falling back to persistent store");
                from_persistent()
            }
        },
    }
}
