use duet_models::{ConfigError, ErrorKind};
use duet_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Payload encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::Store(e) => e.kind(),
            MemoryError::Config(_) => ErrorKind::Config,
            MemoryError::Json(_) => ErrorKind::Malformed,
            MemoryError::InvalidInput(_) | MemoryError::NoRuntime(_) => ErrorKind::InvalidInput,
            MemoryError::Task(_) => ErrorKind::Unavailable,
        }
    }
}
