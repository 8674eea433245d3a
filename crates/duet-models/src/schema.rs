use chrono::{DateTime, SecondsFormat, Utc};

/// SQLite schema for the persistent store.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS shared_memories (
///     id          TEXT PRIMARY KEY,
///     source      TEXT NOT NULL,
///     data_type   TEXT NOT NULL,
///     content     TEXT NOT NULL,
///     metadata    TEXT NOT NULL,
///     timestamp   TEXT NOT NULL,
///     score       REAL NOT NULL DEFAULT 0.0,
///     tags        TEXT NOT NULL,
///     created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
///     updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
/// );
/// ```
///
/// `market_data_cache`, `agent_decisions_cache` and `cross_framework_events`
/// follow the same shape: natural key columns, a JSON payload column, the
/// caller's `timestamp`, and server-assigned `created_at`/`updated_at`.
pub const MEMORY_SCHEMA_DDL: &str = "\
CREATE TABLE IF NOT EXISTS shared_memories (
    id          TEXT PRIMARY KEY,
    source      TEXT NOT NULL,
    data_type   TEXT NOT NULL,
    content     TEXT NOT NULL,
    metadata    TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    score       REAL NOT NULL DEFAULT 0.0,
    tags        TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_shared_source ON shared_memories(source);
CREATE INDEX IF NOT EXISTS idx_shared_type ON shared_memories(data_type);
CREATE INDEX IF NOT EXISTS idx_shared_timestamp ON shared_memories(timestamp);

CREATE TABLE IF NOT EXISTS market_data_cache (
    id             TEXT PRIMARY KEY,
    instrument_id  TEXT NOT NULL,
    data_type      TEXT NOT NULL,
    data           TEXT NOT NULL,
    timestamp      TEXT NOT NULL,
    created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_market_instrument ON market_data_cache(instrument_id, data_type);
CREATE INDEX IF NOT EXISTS idx_market_timestamp ON market_data_cache(timestamp);

CREATE TABLE IF NOT EXISTS agent_decisions_cache (
    id             TEXT PRIMARY KEY,
    agent_id       TEXT NOT NULL,
    task_id        TEXT,
    decision_type  TEXT NOT NULL,
    decision_data  TEXT NOT NULL,
    confidence     REAL NOT NULL DEFAULT 0.0,
    timestamp      TEXT NOT NULL,
    created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_decisions_agent ON agent_decisions_cache(agent_id, decision_type);
CREATE INDEX IF NOT EXISTS idx_decisions_timestamp ON agent_decisions_cache(timestamp);

CREATE TABLE IF NOT EXISTS cross_framework_events (
    id                TEXT PRIMARY KEY,
    event_type        TEXT NOT NULL,
    source_framework  TEXT NOT NULL,
    target_framework  TEXT,
    event_data        TEXT NOT NULL,
    processed         INTEGER NOT NULL DEFAULT 0,
    timestamp         TEXT NOT NULL,
    created_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_events_processed ON cross_framework_events(processed, target_framework);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON cross_framework_events(timestamp);
";

/// Every table the persistent store owns, in purge order.
pub const MEMORY_TABLES: [&str; 4] = [
    "shared_memories",
    "market_data_cache",
    "agent_decisions_cache",
    "cross_framework_events",
];

/// Fixed-width RFC 3339 (microseconds, `Z` suffix) so that lexical order in
/// SQLite matches chronological order.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Lifetime of a single published event in the cache.
pub const EVENT_TTL_SECONDS: u64 = 300;
/// Lifetime of a per-target event queue, refreshed on every publish.
pub const EVENT_QUEUE_TTL_SECONDS: u64 = 600;
/// Most recent event ids kept per target queue.
pub const EVENT_QUEUE_CAPACITY: usize = 50;
/// Lifetime of the active-signals list, refreshed on every signal.
pub const ACTIVE_SIGNALS_TTL_SECONDS: u64 = 3600;
/// Most recent signal ids kept in the active-signals list.
pub const ACTIVE_SIGNALS_CAPACITY: usize = 100;

/// Cache key conventions.
///
/// Every key lives under `{namespace}:{category}:...` so a whole namespace or
/// a single category can be cleared by prefix.
///
/// - Market data: `{ns}:market:{instrument}:{data_type}`
/// - Latest market pointer: `{ns}:latest:market:{instrument}`
/// - Agent decision: `{ns}:agent:{agent}:{decision_type}`
/// - Latest decision pointer: `{ns}:latest:agent:{agent}`
/// - Trading signal: `{ns}:signal:{signal_id}`
/// - Active signals list: `{ns}:active:signals`
/// - System state: `{ns}:state:{component}`
/// - Event: `{ns}:event:{event_id}`
/// - Event queue: `{ns}:queue:events:{target|all}`
pub mod key_patterns {
    pub fn market_data(ns: &str, instrument_id: &str, data_type: &str) -> String {
        format!("{ns}:market:{instrument_id}:{data_type}")
    }

    pub fn latest_market_data(ns: &str, instrument_id: &str) -> String {
        format!("{ns}:latest:market:{instrument_id}")
    }

    pub fn agent_decision(ns: &str, agent_id: &str, decision_type: &str) -> String {
        format!("{ns}:agent:{agent_id}:{decision_type}")
    }

    pub fn latest_agent_decision(ns: &str, agent_id: &str) -> String {
        format!("{ns}:latest:agent:{agent_id}")
    }

    pub fn trading_signal(ns: &str, signal_id: &str) -> String {
        format!("{ns}:signal:{signal_id}")
    }

    pub fn active_signals(ns: &str) -> String {
        format!("{ns}:active:signals")
    }

    pub fn system_state(ns: &str, component: &str) -> String {
        format!("{ns}:state:{component}")
    }

    pub fn event(ns: &str, event_id: &str) -> String {
        format!("{ns}:event:{event_id}")
    }

    /// Queue for a target framework; `None` is the broadcast queue `all`.
    pub fn event_queue(ns: &str, target: Option<&str>) -> String {
        format!("{ns}:queue:events:{}", target.unwrap_or("all"))
    }

    /// Prefix covering a whole namespace, or one category inside it.
    pub fn namespace_prefix(ns: &str, category: Option<&str>) -> String {
        match category {
            Some(category) => format!("{ns}:{category}:"),
            None => format!("{ns}:"),
        }
    }
}
