use std::sync::Arc;
use std::time::Instant;

use duet_memory::{MemoryError, UnifiedMemory};

use super::error::{AppError, AppResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    memory: Arc<UnifiedMemory>,
    started: Instant,
}

impl AppState {
    pub fn new(memory: Arc<UnifiedMemory>) -> Self {
        Self {
            memory,
            started: Instant::now(),
        }
    }

    pub fn memory(&self) -> &Arc<UnifiedMemory> {
        &self.memory
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Run a store operation on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(&UnifiedMemory) -> Result<T, MemoryError> + Send + 'static,
        T: Send + 'static,
    {
        let memory = Arc::clone(&self.memory);
        tokio::task::spawn_blocking(move || op(&memory))
            .await
            .map_err(|e| AppError::Internal(format!("store task failed: {e}")))?
            .map_err(AppError::from)
    }
}
