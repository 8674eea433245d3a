use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Market data fields the integration reads, plus whatever else the trading
/// engine attached (order book levels, bar spec, venue...) in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketDataPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MarketDataPayload {
    pub fn close(close: f64) -> Self {
        Self {
            close: Some(close),
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Output of an agent's task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DecisionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DecisionPayload {
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

fn unknown_action() -> String {
    "unknown".to_string()
}

/// A trade instruction handed from the agent side to the trading side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalPayload {
    #[serde(default = "unknown_action")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    /// 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignalPayload {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            instrument_id: None,
            confidence: None,
            extra: Map::new(),
        }
    }

    pub fn for_instrument(mut self, instrument_id: impl Into<String>) -> Self {
        self.instrument_id = Some(instrument_id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Serialize a payload into a JSON object map.
///
/// Payload structs always serialize to objects; any other shape is wrapped
/// under `"value"`.
pub fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

/// Inverse of [`to_map`].
pub fn from_map<T: for<'de> Deserialize<'de>>(
    map: &Map<String, Value>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(map.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn market_payload_keeps_unknown_fields() {
        let raw = json!({"close": 1.0865, "venue": "SIM", "levels": [1, 2]});
        let payload: MarketDataPayload = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(payload.close, Some(1.0865));
        assert_eq!(payload.extra["venue"], json!("SIM"));
        assert_eq!(serde_json::to_value(&payload).unwrap(), raw);
    }

    #[test]
    fn market_payload_omits_absent_prices() {
        let value = serde_json::to_value(MarketDataPayload::close(1.25)).unwrap();
        assert_eq!(value, json!({"close": 1.25}));
    }

    #[test]
    fn signal_action_defaults_to_unknown() {
        let payload: SignalPayload = serde_json::from_value(json!({"size": 10})).unwrap();
        assert_eq!(payload.action, "unknown");
        assert_eq!(payload.extra["size"], json!(10));
    }

    #[test]
    fn to_map_and_back() {
        let signal = SignalPayload::new("buy")
            .for_instrument("EURUSD")
            .with_confidence(0.7);
        let map = to_map(&signal).unwrap();
        assert_eq!(map["action"], json!("buy"));
        let parsed: SignalPayload = from_map(&map).unwrap();
        assert_eq!(parsed, signal);
    }

    #[test]
    fn decision_payload_from_loose_map() {
        let payload: DecisionPayload =
            serde_json::from_value(json!({"action": "buy", "stop": 1.08})).unwrap();
        assert_eq!(payload.action.as_deref(), Some("buy"));
        assert!(payload.reasoning.is_none());
        assert_eq!(payload.extra["stop"], json!(1.08));
    }
}
