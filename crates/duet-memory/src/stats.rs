use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of both stores and the coordinator's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub cache: CacheStats,
    pub persistent: PersistentStats,
    pub cleanup_interval_seconds: u64,
    pub days_to_keep: u32,
    pub running: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub backend: String,
    pub external: bool,
    pub namespace: String,
    /// `None` when the backend could not be queried.
    pub entries: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistentStats {
    pub path: Option<String>,
    pub tables: BTreeMap<String, u64>,
    pub size_bytes: u64,
}
