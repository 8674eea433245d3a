//! duet: one memory shared by an AI-agent framework and a trading engine.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use duet::models::{DuetConfig, Framework, MarketDataPayload, Placement};
//!
//! let memory = duet::build_memory(&DuetConfig::default()).unwrap();
//! let bar = MarketDataPayload::close(1.0865);
//! memory
//!     .save_market_data("EURUSD", "bar", bar, Framework::Trading, Placement::Both)
//!     .unwrap();
//! ```

pub use duet_bridge as bridge;
pub use duet_memory as memory;
pub use duet_models as models;
pub use duet_store as store;

pub mod server;

use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use duet_memory::{MemoryError, UnifiedMemory};
use duet_models::DuetConfig;

static SHARED: OnceLock<Arc<UnifiedMemory>> = OnceLock::new();

/// Read and validate a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<DuetConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: DuetConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}

/// Build a coordinator from configuration. Not started.
pub fn build_memory(config: &DuetConfig) -> Result<Arc<UnifiedMemory>, MemoryError> {
    Ok(Arc::new(UnifiedMemory::new(config)?))
}

/// Process-wide coordinator, built on first call. Later calls return the
/// existing instance and ignore `config`.
pub fn init_shared(config: &DuetConfig) -> Result<Arc<UnifiedMemory>, MemoryError> {
    if let Some(memory) = SHARED.get() {
        return Ok(Arc::clone(memory));
    }
    let memory = build_memory(config)?;
    // A concurrent initialiser may have won; its instance is kept.
    Ok(Arc::clone(SHARED.get_or_init(|| memory)))
}

/// The process-wide coordinator, if [`init_shared`] has run.
pub fn shared() -> Option<Arc<UnifiedMemory>> {
    SHARED.get().cloned()
}
