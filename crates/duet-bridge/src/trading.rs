use std::sync::Arc;

use chrono::{DateTime, Utc};
use duet_memory::UnifiedMemory;
use duet_models::payload::to_map;
use duet_models::{Framework, MarketDataPayload, MarketDataRecord, Placement};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::market::{Bar, OrderBookSnapshot, Tick};

pub const MARKET_BAR_RECEIVED: &str = "market_bar_received";
pub const MARKET_TICK_RECEIVED: &str = "market_tick_received";
pub const ORDERBOOK_UPDATED: &str = "orderbook_updated";

/// Trading-engine side of the bridge.
///
/// Bars are kept in both stores; ticks and order books are high-frequency
/// and stay in the cache only. Every accepted update is announced to the
/// agent framework.
#[derive(Clone)]
pub struct TradingBridge {
    memory: Arc<UnifiedMemory>,
}

impl TradingBridge {
    pub fn new(memory: Arc<UnifiedMemory>) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &Arc<UnifiedMemory> {
        &self.memory
    }

    /// Returns the market data record id.
    pub fn on_bar(&self, bar: &Bar) -> Result<String, BridgeError> {
        self.ingest(
            &bar.instrument_id,
            "bar",
            bar.to_payload()?,
            bar.ts_event,
            Placement::Both,
            MARKET_BAR_RECEIVED,
            "bar_data",
        )
    }

    pub fn on_tick(&self, tick: &Tick) -> Result<String, BridgeError> {
        self.ingest(
            &tick.instrument_id,
            "tick",
            tick.to_payload()?,
            tick.ts_event,
            Placement::Cache,
            MARKET_TICK_RECEIVED,
            "tick_data",
        )
    }

    pub fn on_order_book(&self, book: &OrderBookSnapshot) -> Result<String, BridgeError> {
        self.ingest(
            &book.instrument_id,
            "orderbook",
            book.to_payload()?,
            book.ts_event,
            Placement::Cache,
            ORDERBOOK_UPDATED,
            "orderbook_data",
        )
    }

    /// Latest cached bar, tick or book for an instrument.
    pub fn latest(
        &self,
        instrument_id: &str,
        data_type: &str,
    ) -> Result<Option<MarketDataRecord>, BridgeError> {
        Ok(self
            .memory
            .get_market_data(instrument_id, Some(data_type), Placement::Cache)?)
    }

    #[allow(clippy::too_many_arguments)]
    fn ingest(
        &self,
        instrument_id: &str,
        data_type: &str,
        payload: MarketDataPayload,
        ts_event: DateTime<Utc>,
        placement: Placement,
        event_type: &str,
        data_key: &str,
    ) -> Result<String, BridgeError> {
        let mut event = Map::new();
        event.insert("instrument_id".into(), Value::from(instrument_id));
        event.insert(data_key.into(), Value::Object(to_map(&payload)?));
        event.insert("timestamp".into(), Value::from(ts_event.to_rfc3339()));

        let id = match self.memory.save_market_data(
            instrument_id,
            data_type,
            payload,
            Framework::Trading,
            placement,
        ) {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    instrument = %instrument_id,
                    data_type,
                    error = %e,
                    "Market data not saved, event withheld"
                );
                return Err(e.into());
            }
        };

        self.memory
            .publish_event(event_type, event, Framework::Trading, Some(Framework::Agent))?;
        debug!(instrument = %instrument_id, data_type, "Market data bridged");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_models::MemoryConfig;
    use rust_decimal_macros::dec;

    fn bridge() -> TradingBridge {
        let memory = UnifiedMemory::in_memory(MemoryConfig::default()).unwrap();
        TradingBridge::new(Arc::new(memory))
    }

    fn tick() -> Tick {
        Tick {
            instrument_id: "EURUSD.SIM".into(),
            price: dec!(1.0866),
            size: dec!(50000),
            aggressor_side: None,
            trade_id: Some("T-1".into()),
            ts_event: Utc::now(),
        }
    }

    #[test]
    fn bar_is_durable_and_announced() {
        let bridge = bridge();
        let bar = Bar {
            instrument_id: "EURUSD.SIM".into(),
            bar_type: "EURUSD.SIM-1-MINUTE-BID-EXTERNAL".into(),
            open: dec!(1.0850),
            high: dec!(1.0870),
            low: dec!(1.0845),
            close: dec!(1.0865),
            volume: dec!(125000),
            ts_event: Utc::now(),
        };
        let id = bridge.on_bar(&bar).unwrap();

        let durable = bridge
            .memory()
            .get_market_data("EURUSD.SIM", Some("bar"), Placement::Persistent)
            .unwrap()
            .unwrap();
        assert_eq!(durable.id, id);

        let events = bridge.memory().get_events(Some(Framework::Agent)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, MARKET_BAR_RECEIVED);
        assert_eq!(events[0].source_framework, Framework::Trading);
        assert!(events[0].data["bar_data"]["close"].is_number());
    }

    #[test]
    fn tick_stays_in_cache() {
        let bridge = bridge();
        bridge.on_tick(&tick()).unwrap();

        assert!(bridge.latest("EURUSD.SIM", "tick").unwrap().is_some());
        assert!(bridge
            .memory()
            .get_market_data("EURUSD.SIM", Some("tick"), Placement::Persistent)
            .unwrap()
            .is_none());
        let events = bridge.memory().get_events(Some(Framework::Agent)).unwrap();
        assert_eq!(events[0].event_type, MARKET_TICK_RECEIVED);
        assert_eq!(events[0].data["tick_data"]["trade_id"], "T-1");
    }

    #[test]
    fn order_book_stays_in_cache() {
        let bridge = bridge();
        let book = OrderBookSnapshot {
            instrument_id: "EURUSD.SIM".into(),
            bids: vec![],
            asks: vec![],
            ts_event: Utc::now(),
        };
        bridge.on_order_book(&book).unwrap();
        assert!(bridge.latest("EURUSD.SIM", "orderbook").unwrap().is_some());
        let events = bridge.memory().get_events(Some(Framework::Agent)).unwrap();
        assert_eq!(events[0].event_type, ORDERBOOK_UPDATED);
    }

    #[test]
    fn rejected_update_publishes_nothing() {
        let bridge = bridge();
        let mut bad = tick();
        bad.instrument_id = String::new();
        assert!(bridge.on_tick(&bad).is_err());
        assert!(bridge.memory().get_events(Some(Framework::Agent)).unwrap().is_empty());
    }
}
