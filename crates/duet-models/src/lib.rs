pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod framework;
pub mod ids;
pub mod payload;
pub mod records;
pub mod schema;

pub use config::{ConfigError, DuetConfig, MemoryConfig, RedisConfig, ServerConfig};
pub use entry::{MemoryQuery, SharedMemoryEntry};
pub use error::ErrorKind;
pub use event::MemoryEvent;
pub use framework::{Framework, Placement};
pub use payload::{DecisionPayload, MarketDataPayload, SignalPayload};
pub use records::{
    AgentDecisionRecord, CrossFrameworkEvent, MarketDataRecord, SystemStateRecord,
    TradingSignalRecord,
};
