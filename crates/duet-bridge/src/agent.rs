use std::sync::Arc;

use duet_memory::UnifiedMemory;
use duet_models::payload::to_map;
use duet_models::{AgentDecisionRecord, DecisionPayload, Framework, Placement, SignalPayload};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::BridgeError;

pub const AGENT_DECISION_MADE: &str = "agent_decision_made";
pub const TRADING_SIGNAL_GENERATED: &str = "trading_signal_generated";

/// Agent-framework side of the bridge. Decisions and signals are stored in
/// both places and announced after a successful save.
#[derive(Clone)]
pub struct AgentBridge {
    memory: Arc<UnifiedMemory>,
}

impl AgentBridge {
    pub fn new(memory: Arc<UnifiedMemory>) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &Arc<UnifiedMemory> {
        &self.memory
    }

    /// Store a decision and notify the trading framework. Returns the record id.
    pub fn record_decision(
        &self,
        agent_id: &str,
        decision_type: &str,
        decision: DecisionPayload,
        confidence: f64,
        task_id: Option<&str>,
    ) -> Result<String, BridgeError> {
        let decision_data = to_map(&decision)?;
        let id = self
            .memory
            .save_agent_decision(
                agent_id,
                decision_type,
                decision,
                confidence,
                task_id,
                Framework::Agent,
                Placement::Both,
            )
            .inspect_err(|e| {
                warn!(agent = %agent_id, decision_type, error = %e, "Decision not saved")
            })?;

        let mut event = Map::new();
        event.insert("agent_id".into(), Value::from(agent_id));
        event.insert("decision_type".into(), Value::from(decision_type));
        event.insert("decision_data".into(), Value::Object(decision_data));
        event.insert("confidence".into(), Value::from(confidence));
        event.insert("task_id".into(), task_id.map(Value::from).unwrap_or(Value::Null));
        self.memory.publish_event(
            AGENT_DECISION_MADE,
            event,
            Framework::Agent,
            Some(Framework::Trading),
        )?;
        Ok(id)
    }

    /// Store a signal and broadcast it.
    pub fn emit_signal(&self, signal_id: &str, signal: SignalPayload) -> Result<(), BridgeError> {
        let signal_data = to_map(&signal)?;
        let action = signal.action.clone();
        self.memory
            .save_trading_signal(signal_id, signal, Framework::Agent, Placement::Both)
            .inspect_err(|e| warn!(signal = %signal_id, error = %e, "Signal not saved"))?;

        let mut event = Map::new();
        event.insert("signal_id".into(), Value::from(signal_id));
        event.insert("signal_data".into(), Value::Object(signal_data));
        event.insert("source".into(), Value::from(Framework::Agent.as_str()));
        self.memory
            .publish_event(TRADING_SIGNAL_GENERATED, event, Framework::Agent, None)?;
        info!(signal = %signal_id, action = %action, "Trading signal emitted");
        Ok(())
    }

    /// Durable decision history for one agent, most recent first.
    pub fn decision_history(
        &self,
        agent_id: &str,
        decision_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentDecisionRecord>, BridgeError> {
        Ok(self
            .memory
            .get_agent_decision_history(agent_id, decision_type, limit)?)
    }
}
