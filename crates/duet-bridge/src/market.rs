use chrono::{DateTime, Utc};
use duet_models::MarketDataPayload;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::BridgeError;

/// Order book levels kept per side when a snapshot is stored.
pub const BOOK_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggressorSide {
    Buyer,
    Seller,
}

/// A completed OHLCV bar from the trading engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub instrument_id: String,
    /// Aggregation spec, e.g. "EURUSD.SIM-1-MINUTE-BID-EXTERNAL".
    pub bar_type: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub ts_event: DateTime<Utc>,
}

/// A single trade print.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub instrument_id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub aggressor_side: Option<AggressorSide>,
    pub trade_id: Option<String>,
    pub ts_event: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Top-of-book snapshot. Bids best-first (descending), asks best-first (ascending).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBookSnapshot {
    pub instrument_id: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub ts_event: DateTime<Utc>,
}

fn to_f64(field: &str, value: Decimal) -> Result<f64, BridgeError> {
    value
        .to_f64()
        .ok_or_else(|| {
            BridgeError::InvalidMarketData(format!("{field} not representable: {value}"))
        })
}

fn levels_json(levels: &[BookLevel]) -> Result<Value, BridgeError> {
    let mut out = Vec::with_capacity(levels.len().min(BOOK_DEPTH));
    for level in levels.iter().take(BOOK_DEPTH) {
        out.push(json!({
            "price": to_f64("price", level.price)?,
            "size": to_f64("size", level.size)?,
        }));
    }
    Ok(Value::Array(out))
}

impl Bar {
    pub fn to_payload(&self) -> Result<MarketDataPayload, BridgeError> {
        if self.high < self.low {
            return Err(BridgeError::InvalidMarketData(format!(
                "{}: high {} below low {}",
                self.instrument_id, self.high, self.low
            )));
        }
        Ok(MarketDataPayload {
            open: Some(to_f64("open", self.open)?),
            high: Some(to_f64("high", self.high)?),
            low: Some(to_f64("low", self.low)?),
            close: Some(to_f64("close", self.close)?),
            volume: Some(to_f64("volume", self.volume)?),
            ..MarketDataPayload::default()
        }
        .with_extra("bar_type", self.bar_type.as_str())
        .with_extra("ts_event", self.ts_event.to_rfc3339()))
    }
}

impl Tick {
    pub fn to_payload(&self) -> Result<MarketDataPayload, BridgeError> {
        let mut payload = MarketDataPayload {
            close: Some(to_f64("price", self.price)?),
            volume: Some(to_f64("size", self.size)?),
            ..MarketDataPayload::default()
        }
        .with_extra("ts_event", self.ts_event.to_rfc3339());
        if let Some(side) = self.aggressor_side {
            payload = payload.with_extra("aggressor_side", serde_json::to_value(side)?);
        }
        if let Some(trade_id) = &self.trade_id {
            payload = payload.with_extra("trade_id", trade_id.as_str());
        }
        Ok(payload)
    }
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Best ask minus best bid, when both sides are present.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn to_payload(&self) -> Result<MarketDataPayload, BridgeError> {
        let mut payload = MarketDataPayload {
            bid: self.best_bid().map(|l| to_f64("bid", l.price)).transpose()?,
            ask: self.best_ask().map(|l| to_f64("ask", l.price)).transpose()?,
            ..MarketDataPayload::default()
        }
        .with_extra("bids", levels_json(&self.bids)?)
        .with_extra("asks", levels_json(&self.asks)?)
        .with_extra("ts_event", self.ts_event.to_rfc3339());
        if let Some(spread) = self.spread() {
            payload = payload.with_extra("spread", to_f64("spread", spread)?);
        }
        Ok(payload)
    }
}
