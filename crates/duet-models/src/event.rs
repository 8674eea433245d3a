use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::framework::{Framework, Placement};

/// Notification handed to registered callbacks after a save.
///
/// Dispatched whatever the outcome of the underlying store writes, since the
/// save has already been attempted by the time callbacks run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MemoryEvent {
    MarketDataSaved {
        instrument_id: String,
        data_type: String,
        source: Framework,
        placement: Placement,
    },
    AgentDecisionSaved {
        agent_id: String,
        decision_type: String,
        confidence: f64,
        source: Framework,
        placement: Placement,
    },
    TradingSignalSaved {
        signal_id: String,
        action: String,
        source: Framework,
        placement: Placement,
    },
    SystemStateUpdated {
        component: String,
        source: Framework,
    },
}

impl MemoryEvent {
    pub const MARKET_DATA_SAVED: &'static str = "market_data_saved";
    pub const AGENT_DECISION_SAVED: &'static str = "agent_decision_saved";
    pub const TRADING_SIGNAL_SAVED: &'static str = "trading_signal_saved";
    pub const SYSTEM_STATE_UPDATED: &'static str = "system_state_updated";

    /// Registry key callbacks subscribe under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MarketDataSaved { .. } => Self::MARKET_DATA_SAVED,
            Self::AgentDecisionSaved { .. } => Self::AGENT_DECISION_SAVED,
            Self::TradingSignalSaved { .. } => Self::TRADING_SIGNAL_SAVED,
            Self::SystemStateUpdated { .. } => Self::SYSTEM_STATE_UPDATED,
        }
    }

    pub fn source(&self) -> Framework {
        match self {
            Self::MarketDataSaved { source, .. }
            | Self::AgentDecisionSaved { source, .. }
            | Self::TradingSignalSaved { source, .. }
            | Self::SystemStateUpdated { source, .. } => *source,
        }
    }

    /// Flat attribute map (without the `event` tag), for callbacks that
    /// forward the notification as an event payload.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("event");
                map
            }
            _ => Map::new(),
        }
    }
}
