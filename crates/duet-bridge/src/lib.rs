//! Adapters between the trading engine, the agent framework and the
//! unified memory.

pub mod agent;
pub mod analysis;
pub mod error;
pub mod inbox;
pub mod market;
pub mod reactions;
pub mod trading;

pub use agent::AgentBridge;
pub use analysis::{AnalysisTask, SignalAnalyst};
pub use error::BridgeError;
pub use inbox::{DrainReport, SignalInbox};
pub use market::{AggressorSide, Bar, BookLevel, OrderBookSnapshot, Tick};
pub use reactions::Reactions;
pub use trading::TradingBridge;
