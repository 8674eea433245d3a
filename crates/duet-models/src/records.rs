use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::framework::Framework;
use crate::ids;
use crate::payload::{DecisionPayload, MarketDataPayload, SignalPayload};

/// One market data observation (bar, tick, order book snapshot...).
///
/// The same record (and id) is written to whichever stores the placement
/// selects; the cache copy doubles as the "latest value" for the instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketDataRecord {
    pub id: String,
    pub instrument_id: String,
    pub data_type: String,
    pub data: MarketDataPayload,
    pub timestamp: DateTime<Utc>,
}

impl MarketDataRecord {
    pub fn new(
        instrument_id: impl Into<String>,
        data_type: impl Into<String>,
        data: MarketDataPayload,
    ) -> Self {
        let instrument_id = instrument_id.into();
        let data_type = data_type.into();
        Self {
            id: ids::market_data_id(&instrument_id, &data_type),
            instrument_id,
            data_type,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A decision produced by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDecisionRecord {
    pub id: String,
    pub agent_id: String,
    pub decision_type: String,
    pub task_id: Option<String>,
    pub data: DecisionPayload,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl AgentDecisionRecord {
    pub fn new(
        agent_id: impl Into<String>,
        decision_type: impl Into<String>,
        data: DecisionPayload,
        confidence: f64,
    ) -> Self {
        let agent_id = agent_id.into();
        let decision_type = decision_type.into();
        Self {
            id: ids::decision_id(&agent_id, &decision_type),
            agent_id,
            decision_type,
            task_id: None,
            data,
            confidence,
            timestamp: Utc::now(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A trading signal, addressed by a caller-chosen id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingSignalRecord {
    pub signal_id: String,
    pub source: Framework,
    pub data: SignalPayload,
    pub timestamp: DateTime<Utc>,
}

impl TradingSignalRecord {
    pub fn new(signal_id: impl Into<String>, source: Framework, data: SignalPayload) -> Self {
        Self {
            signal_id: signal_id.into(),
            source,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Ephemeral runtime status of one component. Cache only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemStateRecord {
    pub component: String,
    pub source: Framework,
    pub state: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl SystemStateRecord {
    pub fn new(component: impl Into<String>, source: Framework, state: Map<String, Value>) -> Self {
        Self {
            component: component.into(),
            source,
            state,
            timestamp: Utc::now(),
        }
    }
}

/// A message from one framework to the other (`target_framework = None`
/// broadcasts to both).
///
/// Unprocessed events are visible to pending queries until a consumer marks
/// them processed; only processed events are ever garbage-collected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossFrameworkEvent {
    pub id: String,
    pub event_type: String,
    pub source_framework: Framework,
    pub target_framework: Option<Framework>,
    pub data: Map<String, Value>,
    #[serde(default)]
    pub processed: bool,
    pub timestamp: DateTime<Utc>,
}

impl CrossFrameworkEvent {
    pub fn new(
        event_type: impl Into<String>,
        source: Framework,
        data: Map<String, Value>,
        target: Option<Framework>,
    ) -> Self {
        let event_type = event_type.into();
        Self {
            id: ids::event_id(source, &event_type),
            event_type,
            source_framework: source,
            target_framework: target,
            data,
            processed: false,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether a consumer polling as `target` should see this event.
    pub fn is_visible_to(&self, target: Option<Framework>) -> bool {
        match (target, self.target_framework) {
            (None, _) | (_, None) => true,
            (Some(wanted), Some(actual)) => wanted == actual,
        }
    }
}
