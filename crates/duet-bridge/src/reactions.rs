//! Follow-up events fired from save callbacks.
//!
//! A new bar asks the agent side for technical analysis; a strong buy or
//! sell decision is escalated to the trading side. Handlers hold a weak
//! reference so the coordinator does not keep itself alive through its own
//! callback registry.

use std::sync::{Arc, Weak};

use duet_memory::{callback, MemoryCallback, UnifiedMemory};
use duet_models::{Framework, MemoryEvent, Placement};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

pub const TECHNICAL_ANALYSIS_TRIGGER: &str = "technical_analysis_trigger";
pub const HIGH_CONFIDENCE_DECISION: &str = "high_confidence_decision";

/// Decisions above this confidence are escalated.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;

const ESCALATED_DECISIONS: [&str; 2] = ["buy_signal", "sell_signal"];

/// Registered reaction handles. Dropping this does not unregister them;
/// call [`Reactions::uninstall`].
pub struct Reactions {
    memory: Weak<UnifiedMemory>,
    on_market_data: MemoryCallback,
    on_decision: MemoryCallback,
}

impl Reactions {
    pub fn install(memory: &Arc<UnifiedMemory>) -> Self {
        let weak = Arc::downgrade(memory);

        let bar_memory = weak.clone();
        let on_market_data = callback(move |event| {
            let Some(memory) = bar_memory.upgrade() else {
                return Ok(());
            };
            react_to_market_data(&memory, event)
        });

        let decision_memory = weak.clone();
        let on_decision = callback(move |event| {
            let Some(memory) = decision_memory.upgrade() else {
                return Ok(());
            };
            react_to_decision(&memory, event)
        });

        memory.register_callback(MemoryEvent::MARKET_DATA_SAVED, Arc::clone(&on_market_data));
        memory.register_callback(MemoryEvent::AGENT_DECISION_SAVED, Arc::clone(&on_decision));

        Self {
            memory: weak,
            on_market_data,
            on_decision,
        }
    }

    pub fn uninstall(self) {
        if let Some(memory) = self.memory.upgrade() {
            memory.unregister_callback(MemoryEvent::MARKET_DATA_SAVED, &self.on_market_data);
            memory.unregister_callback(MemoryEvent::AGENT_DECISION_SAVED, &self.on_decision);
        }
    }
}

fn react_to_market_data(memory: &UnifiedMemory, event: &MemoryEvent) -> anyhow::Result<()> {
    let MemoryEvent::MarketDataSaved {
        instrument_id,
        data_type,
        ..
    } = event
    else {
        return Ok(());
    };
    if data_type != "bar" {
        return Ok(());
    }

    // A persistent-only bar has nothing fresh in the cache to analyse.
    let Some(latest) = memory.get_market_data(instrument_id, Some("bar"), Placement::Cache)? else {
        debug!(instrument = %instrument_id, "No cached bar, analysis not triggered");
        return Ok(());
    };

    let mut data = Map::new();
    data.insert("instrument_id".into(), Value::from(instrument_id.as_str()));
    data.insert("trigger_reason".into(), json!("new_bar_data"));
    data.insert("data_timestamp".into(), json!(latest.timestamp));
    memory.publish_event(
        TECHNICAL_ANALYSIS_TRIGGER,
        data,
        Framework::Trading,
        Some(Framework::Agent),
    )?;
    Ok(())
}

fn react_to_decision(memory: &UnifiedMemory, event: &MemoryEvent) -> anyhow::Result<()> {
    let MemoryEvent::AgentDecisionSaved {
        agent_id,
        decision_type,
        confidence,
        ..
    } = event
    else {
        return Ok(());
    };
    if *confidence <= HIGH_CONFIDENCE_THRESHOLD
        || !ESCALATED_DECISIONS.contains(&decision_type.as_str())
    {
        return Ok(());
    }

    info!(
        agent = %agent_id,
        decision_type = %decision_type,
        confidence,
        "High confidence decision"
    );
    let mut data = Map::new();
    data.insert("agent_id".into(), Value::from(agent_id.as_str()));
    data.insert("decision_type".into(), Value::from(decision_type.as_str()));
    data.insert("confidence".into(), Value::from(*confidence));
    data.insert("priority".into(), json!("high"));
    data.insert("requires_action".into(), json!(true));
    memory.publish_event(
        HIGH_CONFIDENCE_DECISION,
        data,
        Framework::Agent,
        Some(Framework::Trading),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_models::{DecisionPayload, MarketDataPayload, MemoryConfig};

    fn memory() -> Arc<UnifiedMemory> {
        Arc::new(UnifiedMemory::in_memory(MemoryConfig::default()).unwrap())
    }

    fn event_types(memory: &UnifiedMemory, target: Framework) -> Vec<String> {
        memory
            .get_events(Some(target))
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[test]
    fn cached_bar_triggers_analysis() {
        let memory = memory();
        let _reactions = Reactions::install(&memory);
        memory
            .save_market_data(
                "EURUSD",
                "bar",
                MarketDataPayload::close(1.0),
                Framework::Trading,
                Placement::Both,
            )
            .unwrap();
        assert_eq!(event_types(&memory, Framework::Agent), vec![TECHNICAL_ANALYSIS_TRIGGER]);
    }

    #[test]
    fn durable_only_bar_and_ticks_do_not_trigger() {
        let memory = memory();
        let _reactions = Reactions::install(&memory);
        memory
            .save_market_data(
                "EURUSD",
                "bar",
                MarketDataPayload::close(1.0),
                Framework::Trading,
                Placement::Persistent,
            )
            .unwrap();
        memory
            .save_market_data(
                "EURUSD",
                "tick",
                MarketDataPayload::close(1.0),
                Framework::Trading,
                Placement::Cache,
            )
            .unwrap();
        assert!(event_types(&memory, Framework::Agent).is_empty());
    }

    #[test]
    fn only_strong_buy_or_sell_is_escalated() {
        let memory = memory();
        let _reactions = Reactions::install(&memory);
        let save = |decision_type: &str, confidence: f64| {
            memory
                .save_agent_decision(
                    "analyst",
                    decision_type,
                    DecisionPayload::default(),
                    confidence,
                    None,
                    Framework::Agent,
                    Placement::Cache,
                )
                .unwrap();
        };
        save("buy_signal", 0.8);
        save("hold", 0.95);
        save("sell_signal", 0.9);

        let events = memory.get_events(Some(Framework::Trading)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, HIGH_CONFIDENCE_DECISION);
        assert_eq!(events[0].data["decision_type"], json!("sell_signal"));
        assert_eq!(events[0].data["priority"], json!("high"));
    }

    #[test]
    fn uninstall_stops_reactions() {
        let memory = memory();
        Reactions::install(&memory).uninstall();
        memory
            .save_market_data(
                "EURUSD",
                "bar",
                MarketDataPayload::close(1.0),
                Framework::Trading,
                Placement::Both,
            )
            .unwrap();
        assert!(event_types(&memory, Framework::Agent).is_empty());
    }
}
