use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::framework::Framework;

/// A tagged record in the generic shared-memory table.
///
/// Saving an entry whose `id` already exists replaces the stored row. When
/// `id` is `None` the store generates `{source}_{data_type}_{millis}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedMemoryEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub source: Framework,
    /// Free-form tag such as `market_data_bar` or `trading_signal`.
    pub data_type: String,
    #[serde(default)]
    pub content: Map<String, Value>,
    /// Secondary indexing fields (instrument id, agent id...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// Ranking / confidence value.
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SharedMemoryEntry {
    pub fn new(source: Framework, data_type: impl Into<String>) -> Self {
        Self {
            id: None,
            source,
            data_type: data_type.into(),
            content: Map::new(),
            metadata: Map::new(),
            timestamp: Utc::now(),
            score: 0.0,
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_content(mut self, content: Map<String, Value>) -> Self {
        self.content = content;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// String metadata field, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Filter for listing shared-memory entries.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryQuery {
    pub source: Option<Framework>,
    pub data_type: Option<String>,
    pub limit: usize,
    pub min_score: f64,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            source: None,
            data_type: None,
            limit: 100,
            min_score: 0.0,
        }
    }
}

impl MemoryQuery {
    pub fn source(mut self, source: Framework) -> Self {
        self.source = Some(source);
        self
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }
}
