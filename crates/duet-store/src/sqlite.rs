use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use duet_models::ids;
use duet_models::schema::{decode_timestamp, encode_timestamp, MEMORY_SCHEMA_DDL, MEMORY_TABLES};
use duet_models::{
    AgentDecisionRecord, CrossFrameworkEvent, Framework, MarketDataRecord, MemoryQuery,
    SharedMemoryEntry,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::StoreError;

/// Rows removed by one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub market_data: usize,
    pub events: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.market_data + self.events
    }
}

/// Durable store for shared-memory entries, market data, agent decisions and
/// cross-framework events.
///
/// `rusqlite::Connection` is not `Sync`, so the single connection lives behind
/// a `Mutex` and every operation holds the lock for its whole duration. Two
/// callers' writes are therefore strictly ordered.
pub struct PersistentStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl PersistentStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(MEMORY_SCHEMA_DDL)?;
        info!(path = %path.display(), journal_mode = %mode, "Persistent store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database with the schema applied. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MEMORY_SCHEMA_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    // ---- shared memories ----

    /// Upsert by id, generating one when the entry has none. Returns the id.
    pub fn save_shared_memory(&self, entry: &SharedMemoryEntry) -> Result<String, StoreError> {
        let id = match entry.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => ids::shared_entry_id(entry.source, &entry.data_type),
        };
        let now = encode_timestamp(&Utc::now());

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO shared_memories \
             (id, source, data_type, content, metadata, timestamp, score, tags, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
             ON CONFLICT(id) DO UPDATE SET \
             source = excluded.source, data_type = excluded.data_type, \
             content = excluded.content, metadata = excluded.metadata, \
             timestamp = excluded.timestamp, score = excluded.score, \
             tags = excluded.tags, updated_at = excluded.updated_at",
            params![
                id,
                entry.source.as_str(),
                entry.data_type,
                serde_json::to_string(&entry.content)?,
                serde_json::to_string(&entry.metadata)?,
                encode_timestamp(&entry.timestamp),
                entry.score,
                serde_json::to_string(&entry.tags)?,
                now,
            ],
        )?;
        debug!(id = %id, data_type = %entry.data_type, "Shared memory saved");
        Ok(id)
    }

    pub fn load_shared_memory(&self, id: &str) -> Result<Option<SharedMemoryEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, source, data_type, content, metadata, timestamp, score, tags \
             FROM shared_memories WHERE id = ?1",
        )?;
        let raw = stmt.query_row(params![id], SharedRow::from_row).optional()?;
        raw.map(SharedRow::into_entry).transpose()
    }

    /// Filtered listing, most recent first, ties broken by higher score.
    pub fn load_shared_memories(
        &self,
        query: &MemoryQuery,
    ) -> Result<Vec<SharedMemoryEntry>, StoreError> {
        let mut sql = String::from(
            "SELECT id, source, data_type, content, metadata, timestamp, score, tags \
             FROM shared_memories WHERE score >= ?",
        );
        let mut args = vec![SqlValue::Real(query.min_score)];
        if let Some(source) = query.source {
            sql.push_str(" AND source = ?");
            args.push(SqlValue::Text(source.as_str().to_string()));
        }
        if let Some(data_type) = &query.data_type {
            sql.push_str(" AND data_type = ?");
            args.push(SqlValue::Text(data_type.clone()));
        }
        sql.push_str(" ORDER BY timestamp DESC, score DESC LIMIT ?");
        args.push(SqlValue::Integer(limit_arg(query.limit)));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), SharedRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SharedRow::into_entry).collect()
    }

    // ---- market data ----

    pub fn save_market_data(&self, record: &MarketDataRecord) -> Result<(), StoreError> {
        let now = encode_timestamp(&Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO market_data_cache \
             (id, instrument_id, data_type, data, timestamp, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                record.id,
                record.instrument_id,
                record.data_type,
                serde_json::to_string(&record.data)?,
                encode_timestamp(&record.timestamp),
                now,
            ],
        )?;
        Ok(())
    }

    /// Most recent first, bounded by `limit`.
    pub fn get_market_data(
        &self,
        instrument_id: &str,
        data_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MarketDataRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, instrument_id, data_type, data, timestamp FROM market_data_cache \
             WHERE instrument_id = ?1 AND (?2 IS NULL OR data_type = ?2) \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![instrument_id, data_type, limit_arg(limit)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, instrument_id, data_type, data, timestamp)| {
                Ok(MarketDataRecord {
                    id,
                    instrument_id,
                    data_type,
                    data: parse_json(&data)?,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }

    // ---- agent decisions ----

    pub fn save_agent_decision(&self, record: &AgentDecisionRecord) -> Result<(), StoreError> {
        let now = encode_timestamp(&Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO agent_decisions_cache \
             (id, agent_id, task_id, decision_type, decision_data, confidence, timestamp, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                record.id,
                record.agent_id,
                record.task_id,
                record.decision_type,
                serde_json::to_string(&record.data)?,
                record.confidence,
                encode_timestamp(&record.timestamp),
                now,
            ],
        )?;
        Ok(())
    }

    /// Most recent first, bounded by `limit`.
    pub fn get_agent_decisions(
        &self,
        agent_id: &str,
        decision_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentDecisionRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_id, task_id, decision_type, decision_data, confidence, timestamp \
             FROM agent_decisions_cache \
             WHERE agent_id = ?1 AND (?2 IS NULL OR decision_type = ?2) \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![agent_id, decision_type, limit_arg(limit)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, agent_id, task_id, decision_type, data, confidence, timestamp)| {
                    Ok(AgentDecisionRecord {
                        id,
                        agent_id,
                        decision_type,
                        task_id,
                        data: parse_json(&data)?,
                        confidence,
                        timestamp: parse_timestamp(&timestamp)?,
                    })
                },
            )
            .collect()
    }

    // ---- cross-framework events ----

    /// Build and persist a new unprocessed event. Returns its id.
    pub fn create_cross_framework_event(
        &self,
        event_type: &str,
        source: Framework,
        data: serde_json::Map<String, serde_json::Value>,
        target: Option<Framework>,
    ) -> Result<String, StoreError> {
        let event = CrossFrameworkEvent::new(event_type, source, data, target);
        self.insert_event(&event)?;
        Ok(event.id)
    }

    /// Persist an event built elsewhere, keeping its id.
    pub fn insert_event(&self, event: &CrossFrameworkEvent) -> Result<(), StoreError> {
        let now = encode_timestamp(&Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cross_framework_events \
             (id, event_type, source_framework, target_framework, event_data, processed, timestamp, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                event.id,
                event.event_type,
                event.source_framework.as_str(),
                event.target_framework.map(Framework::as_str),
                serde_json::to_string(&event.data)?,
                event.processed,
                encode_timestamp(&event.timestamp),
                now,
            ],
        )?;
        debug!(id = %event.id, event_type = %event.event_type, "Event persisted");
        Ok(())
    }

    pub fn get_event(&self, event_id: &str) -> Result<Option<CrossFrameworkEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, event_type, source_framework, target_framework, event_data, processed, timestamp \
             FROM cross_framework_events WHERE id = ?1",
        )?;
        let raw = stmt.query_row(params![event_id], EventRow::from_row).optional()?;
        raw.map(EventRow::into_event).transpose()
    }

    /// Unprocessed events addressed to `target` or broadcast, oldest first.
    /// With no target, every unprocessed event.
    pub fn get_unprocessed_events(
        &self,
        target: Option<Framework>,
    ) -> Result<Vec<CrossFrameworkEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, event_type, source_framework, target_framework, event_data, processed, timestamp \
             FROM cross_framework_events \
             WHERE processed = 0 AND (?1 IS NULL OR target_framework = ?1 OR target_framework IS NULL) \
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![target.map(Framework::as_str)], EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Flip `processed` to true. Idempotent; returns whether the event exists.
    pub fn mark_event_processed(&self, event_id: &str) -> Result<bool, StoreError> {
        let now = encode_timestamp(&Utc::now());
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE cross_framework_events SET processed = 1, updated_at = ?1 WHERE id = ?2",
            params![now, event_id],
        )?;
        Ok(updated > 0)
    }

    // ---- maintenance ----

    /// Delete market data and processed events older than `days_to_keep`.
    /// Unprocessed events are kept regardless of age.
    pub fn cleanup_old_data(&self, days_to_keep: u32) -> Result<CleanupReport, StoreError> {
        let cutoff = encode_timestamp(&(Utc::now() - chrono::Duration::days(days_to_keep.into())));
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let market_data = tx.execute(
            "DELETE FROM market_data_cache WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let events = tx.execute(
            "DELETE FROM cross_framework_events WHERE processed = 1 AND timestamp < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        let report = CleanupReport {
            market_data,
            events,
        };
        info!(
            days_to_keep,
            market_data = report.market_data,
            events = report.events,
            "Cleaned up old data"
        );
        Ok(report)
    }

    /// Row count per table.
    pub fn table_counts(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let conn = self.conn()?;
        let mut counts = BTreeMap::new();
        for table in MEMORY_TABLES {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            counts.insert(table.to_string(), count.max(0) as u64);
        }
        Ok(counts)
    }

    /// `page_count * page_size`.
    pub fn database_size_bytes(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((pages.max(0) as u64) * (page_size.max(0) as u64))
    }

    /// Delete every row of every table. Returns the number of rows removed.
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for table in MEMORY_TABLES {
            removed += tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.commit()?;
        info!(removed, "Persistent store cleared");
        Ok(removed)
    }
}

fn limit_arg(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Malformed(format!("{e}: {raw}")))
}

fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<Utc>, StoreError> {
    decode_timestamp(raw).map_err(|e| StoreError::Malformed(format!("timestamp {raw:?}: {e}")))
}

fn parse_framework(raw: &str) -> Result<Framework, StoreError> {
    raw.parse().map_err(StoreError::Malformed)
}

struct SharedRow {
    id: String,
    source: String,
    data_type: String,
    content: String,
    metadata: String,
    timestamp: String,
    score: f64,
    tags: String,
}

impl SharedRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            data_type: row.get(2)?,
            content: row.get(3)?,
            metadata: row.get(4)?,
            timestamp: row.get(5)?,
            score: row.get(6)?,
            tags: row.get(7)?,
        })
    }

    fn into_entry(self) -> Result<SharedMemoryEntry, StoreError> {
        Ok(SharedMemoryEntry {
            id: Some(self.id),
            source: parse_framework(&self.source)?,
            data_type: self.data_type,
            content: parse_json(&self.content)?,
            metadata: parse_json(&self.metadata)?,
            timestamp: parse_timestamp(&self.timestamp)?,
            score: self.score,
            tags: parse_json(&self.tags)?,
        })
    }
}

struct EventRow {
    id: String,
    event_type: String,
    source: String,
    target: Option<String>,
    data: String,
    processed: bool,
    timestamp: String,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            event_type: row.get(1)?,
            source: row.get(2)?,
            target: row.get(3)?,
            data: row.get(4)?,
            processed: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }

    fn into_event(self) -> Result<CrossFrameworkEvent, StoreError> {
        Ok(CrossFrameworkEvent {
            id: self.id,
            event_type: self.event_type,
            source_framework: parse_framework(&self.source)?,
            target_framework: self.target.as_deref().map(parse_framework).transpose()?,
            data: parse_json(&self.data)?,
            processed: self.processed,
            timestamp: parse_timestamp(&self.timestamp)?,
        })
    }
}
