use duet_models::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed stored value: {0}")]
    Malformed(String),

    #[error("Store not available: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Json(_) | StoreError::Malformed(_) => ErrorKind::Malformed,
            StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(..))
            | StoreError::Sqlite(rusqlite::Error::InvalidColumnType(..)) => ErrorKind::Malformed,
            StoreError::Sqlite(_)
            | StoreError::Redis(_)
            | StoreError::Io(_)
            | StoreError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(StoreError::from(json_err).kind(), ErrorKind::Malformed);
        assert_eq!(
            StoreError::Unavailable("down".into()).kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows).kind(),
            ErrorKind::Unavailable
        );
    }
}
