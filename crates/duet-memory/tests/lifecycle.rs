use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use duet_memory::UnifiedMemory;
use duet_models::{
    CrossFrameworkEvent, Framework, MarketDataPayload, MarketDataRecord, MemoryConfig,
};
use serde_json::Map;

fn memory_with_interval(seconds: u64) -> UnifiedMemory {
    UnifiedMemory::in_memory(MemoryConfig {
        cleanup_interval_seconds: seconds,
        ..MemoryConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let memory = memory_with_interval(3600);
    assert!(!memory.is_running());

    memory.start().unwrap();
    memory.start().unwrap();
    assert!(memory.is_running());

    memory.stop().await;
    assert!(!memory.is_running());
    memory.stop().await;
    assert!(!memory.is_running());

    // restartable
    memory.start().unwrap();
    assert!(memory.is_running());
    memory.stop().await;
}

#[tokio::test]
async fn stop_returns_promptly() {
    let memory = memory_with_interval(3600);
    memory.start().unwrap();
    tokio::time::timeout(Duration::from_secs(6), memory.stop())
        .await
        .unwrap();
}

#[tokio::test]
async fn zero_interval_runs_without_cleanup_task() {
    let memory = memory_with_interval(0);
    let store = memory.persistent();
    store
        .save_market_data(
            &MarketDataRecord::new("EURUSD", "bar", MarketDataPayload::close(1.0))
                .at(Utc::now() - ChronoDuration::days(30)),
        )
        .unwrap();

    memory.start().unwrap();
    assert!(memory.is_running());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.table_counts().unwrap()["market_data_cache"], 1);
    memory.stop().await;
}

#[tokio::test]
async fn background_sweep_applies_retention() {
    let memory = memory_with_interval(3600);
    let store = memory.persistent();
    let month_ago = Utc::now() - ChronoDuration::days(30);

    store
        .save_market_data(
            &MarketDataRecord::new("EURUSD", "bar", MarketDataPayload::close(1.0)).at(month_ago),
        )
        .unwrap();
    let pending =
        CrossFrameworkEvent::new("pending", Framework::Agent, Map::new(), None).at(month_ago);
    let mut done =
        CrossFrameworkEvent::new("done", Framework::Agent, Map::new(), None).at(month_ago);
    done.processed = true;
    store.insert_event(&pending).unwrap();
    store.insert_event(&done).unwrap();

    memory.start().unwrap();

    let mut swept = false;
    for _ in 0..100 {
        if store.table_counts().unwrap()["market_data_cache"] == 0 {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    memory.stop().await;

    assert!(swept);
    assert!(store.get_event(&pending.id).unwrap().is_some());
    assert!(store.get_event(&done.id).unwrap().is_none());
}

#[tokio::test]
async fn manual_async_cleanup() {
    let memory = memory_with_interval(0);
    memory
        .persistent()
        .save_market_data(
            &MarketDataRecord::new("EURUSD", "bar", MarketDataPayload::close(1.0))
                .at(Utc::now() - ChronoDuration::days(30)),
        )
        .unwrap();
    let report = memory.run_cleanup_async().await.unwrap();
    assert_eq!(report.market_data, 1);
}
