use duet_memory::MemoryError;
use duet_models::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Analyst {analyst} failed: {message}")]
    Analyst { analyst: String, message: String },

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Memory(e) => e.kind(),
            BridgeError::Json(_) => ErrorKind::Malformed,
            BridgeError::Analyst { .. } => ErrorKind::Unavailable,
            BridgeError::InvalidMarketData(_) => ErrorKind::InvalidInput,
        }
    }
}
