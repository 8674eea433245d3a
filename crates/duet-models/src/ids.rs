//! Synthetic id generation.
//!
//! Ids embed an epoch-millisecond component. Two writes inside the same
//! millisecond would otherwise collide on the primary key, so the component
//! comes from a process-wide counter that tracks wall-clock time but never
//! repeats or moves backwards.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::framework::Framework;

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Current epoch milliseconds, bumped past the previously issued value if needed.
pub fn next_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_MILLIS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// `{source}_{data_type}_{millis}`
pub fn shared_entry_id(source: Framework, data_type: &str) -> String {
    format!("{source}_{data_type}_{}", next_millis())
}

/// `{source}_{event_type}_{millis}`
pub fn event_id(source: Framework, event_type: &str) -> String {
    format!("{source}_{event_type}_{}", next_millis())
}

/// `market_{instrument_id}_{data_type}_{millis}`
pub fn market_data_id(instrument_id: &str, data_type: &str) -> String {
    format!("market_{instrument_id}_{data_type}_{}", next_millis())
}

/// `decision_{agent_id}_{decision_type}_{millis}`
pub fn decision_id(agent_id: &str, decision_type: &str) -> String {
    format!("decision_{agent_id}_{decision_type}_{}", next_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn millis_strictly_increase() {
        let mut prev = next_millis();
        for _ in 0..1000 {
            let next = next_millis();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn burst_of_event_ids_is_unique() {
        let ids: HashSet<String> = (0..500)
            .map(|_| event_id(Framework::Trading, "bar"))
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn id_shapes() {
        assert!(event_id(Framework::Agent, "ping").starts_with("agent_ping_"));
        let id = shared_entry_id(Framework::Shared, "trading_signal");
        assert!(id.starts_with("shared_trading_signal_"));
        assert!(market_data_id("EURUSD", "bar").starts_with("market_EURUSD_bar_"));
        assert!(decision_id("analyst", "buy_signal").starts_with("decision_analyst_buy_signal_"));
    }

    #[test]
    fn concurrent_callers_never_share_a_value() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| next_millis()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(all.insert(v), "duplicate millis value {v}");
            }
        }
    }
}
