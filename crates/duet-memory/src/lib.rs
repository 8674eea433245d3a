//! Unified memory coordinator.
//!
//! One API over the persistent store and the cache store. Each save takes a
//! [`Placement`](duet_models::Placement) choosing which store(s) receive the
//! write; reads take the same choice, with `Both` reading the cache first and
//! falling back to the most recent durable row.

pub mod callbacks;
mod cleanup;
pub mod coordinator;
pub mod error;
pub mod stats;

pub use callbacks::{callback, CallbackRegistry, MemoryCallback};
pub use coordinator::{ClearReport, UnifiedMemory};
pub use error::MemoryError;
pub use stats::{CacheStats, MemoryStats, PersistentStats};
