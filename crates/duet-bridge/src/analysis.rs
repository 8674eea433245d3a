use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duet_models::{ids, MarketDataRecord, SignalPayload};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::AgentBridge;
use crate::error::BridgeError;

/// Turns the latest market data for an instrument into an optional signal.
/// Mockable for testing.
#[async_trait]
pub trait SignalAnalyst: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        market: &MarketDataRecord,
    ) -> Result<Option<SignalPayload>, BridgeError>;
}

/// Periodically feeds cached market data to a [`SignalAnalyst`] and emits
/// whatever it produces through the agent bridge. Each market data record
/// is analysed at most once.
pub struct AnalysisTask {
    bridge: AgentBridge,
    analyst: Arc<dyn SignalAnalyst>,
    instruments: Vec<String>,
    data_type: String,
    last_analyzed: HashMap<String, String>,
}

impl AnalysisTask {
    pub fn new(
        bridge: AgentBridge,
        analyst: Arc<dyn SignalAnalyst>,
        instruments: Vec<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            bridge,
            analyst,
            instruments,
            data_type: data_type.into(),
            last_analyzed: HashMap::new(),
        }
    }

    /// One pass over every instrument. Returns the ids of emitted signals.
    /// A failing instrument is logged and skipped.
    pub async fn run_once(&mut self) -> Vec<String> {
        let mut emitted = Vec::new();
        for instrument_id in &self.instruments {
            let market = match self.bridge.memory().get_market_data(
                instrument_id,
                Some(self.data_type.as_str()),
                duet_models::Placement::Cache,
            ) {
                Ok(Some(market)) => market,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        instrument = %instrument_id,
                        error = %e,
                        "Market data unavailable for analysis"
                    );
                    continue;
                }
            };
            if self.last_analyzed.get(instrument_id) == Some(&market.id) {
                continue;
            }

            let signal = match self.analyst.analyze(&market).await {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(
                        analyst = self.analyst.name(),
                        instrument = %instrument_id,
                        error = %e,
                        "Analysis failed"
                    );
                    continue;
                }
            };
            self.last_analyzed.insert(instrument_id.clone(), market.id.clone());

            let Some(mut signal) = signal else {
                debug!(instrument = %instrument_id, "No signal");
                continue;
            };
            if signal.instrument_id.is_none() {
                signal.instrument_id = Some(instrument_id.clone());
            }
            let signal_id = format!(
                "{}_{}_{}",
                self.analyst.name(),
                instrument_id,
                ids::next_millis(),
            );
            match self.bridge.emit_signal(&signal_id, signal) {
                Ok(()) => emitted.push(signal_id),
                Err(e) => error!(signal = %signal_id, error = %e, "Failed to emit signal"),
            }
        }
        emitted
    }

    /// Run passes every `interval` until cancelled.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        info!(
            analyst = self.analyst.name(),
            instruments = self.instruments.len(),
            interval_ms = interval.as_millis() as u64,
            "Analysis loop started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(analyst = self.analyst.name(), "Analysis loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let emitted = self.run_once().await;
                    if !emitted.is_empty() {
                        debug!(count = emitted.len(), "Signals emitted");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_memory::UnifiedMemory;
    use duet_models::{Framework, MarketDataPayload, MemoryConfig, Placement};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Buys when the close is above `threshold`.
    pub struct ThresholdAnalyst {
        pub threshold: f64,
        pub calls: AtomicUsize,
        pub should_fail: bool,
    }

    impl ThresholdAnalyst {
        pub fn new(threshold: f64) -> Self {
            Self {
                threshold,
                calls: AtomicUsize::new(0),
                should_fail: false,
            }
        }
    }

    #[async_trait]
    impl SignalAnalyst for ThresholdAnalyst {
        fn name(&self) -> &str {
            "threshold"
        }

        async fn analyze(
            &self,
            market: &MarketDataRecord,
        ) -> Result<Option<SignalPayload>, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                return Err(BridgeError::Analyst {
                    analyst: "threshold".into(),
                    message: "model offline".into(),
                });
            }
            Ok(market
                .data
                .close
                .filter(|close| *close > self.threshold)
                .map(|_| SignalPayload::new("buy").with_confidence(0.7)))
        }
    }

    fn setup() -> (Arc<UnifiedMemory>, AgentBridge) {
        let memory = Arc::new(UnifiedMemory::in_memory(MemoryConfig::default()).unwrap());
        let bridge = AgentBridge::new(Arc::clone(&memory));
        (memory, bridge)
    }

    fn save_bar(memory: &UnifiedMemory, instrument: &str, close: f64) {
        memory
            .save_market_data(
                instrument,
                "bar",
                MarketDataPayload::close(close),
                Framework::Trading,
                Placement::Cache,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn emits_once_per_market_record() {
        let (memory, bridge) = setup();
        let analyst = Arc::new(ThresholdAnalyst::new(1.0));
        let mut task = AnalysisTask::new(
            bridge,
            analyst.clone(),
            vec!["EURUSD".into(), "GBPUSD".into()],
            "bar",
        );

        save_bar(&memory, "EURUSD", 1.08);
        save_bar(&memory, "GBPUSD", 0.9);

        let emitted = task.run_once().await;
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].starts_with("threshold_EURUSD_"));
        let signal = memory
            .get_trading_signal(&emitted[0], Placement::Cache)
            .unwrap()
            .unwrap();
        assert_eq!(signal.data.instrument_id.as_deref(), Some("EURUSD"));

        // unchanged data is not re-analysed
        assert!(task.run_once().await.is_empty());
        assert_eq!(analyst.calls.load(Ordering::SeqCst), 2);

        save_bar(&memory, "EURUSD", 1.09);
        assert_eq!(task.run_once().await.len(), 1);
    }

    #[tokio::test]
    async fn analyst_failure_is_retried_next_pass() {
        let (memory, bridge) = setup();
        let analyst = Arc::new(ThresholdAnalyst {
            should_fail: true,
            ..ThresholdAnalyst::new(1.0)
        });
        let mut task = AnalysisTask::new(bridge, analyst.clone(), vec!["EURUSD".into()], "bar");
        save_bar(&memory, "EURUSD", 1.08);

        assert!(task.run_once().await.is_empty());
        assert!(task.run_once().await.is_empty());
        assert_eq!(analyst.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let (memory, bridge) = setup();
        save_bar(&memory, "EURUSD", 1.08);
        let task = AnalysisTask::new(
            bridge,
            Arc::new(ThresholdAnalyst::new(1.0)),
            vec!["EURUSD".into()],
            "bar",
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.run(Duration::from_millis(10), cancel.clone()));

        let mut signalled = false;
        for _ in 0..100 {
            if !memory.get_active_signals().unwrap().is_empty() {
                signalled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(signalled);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
