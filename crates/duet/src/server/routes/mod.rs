pub mod events;
pub mod health;
pub mod memory;

use std::str::FromStr;

use super::error::{AppError, AppResult};

/// Parse an optional query value, falling back to `default` when absent.
pub(crate) fn parse_or<T: FromStr<Err = String>>(
    field: &str,
    raw: Option<&str>,
    default: T,
) -> AppResult<T> {
    match raw {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: String| AppError::BadRequest(format!("{field}: {e}"))),
    }
}

/// Parse an optional query value that stays `None` when absent.
pub(crate) fn parse_opt<T: FromStr<Err = String>>(
    field: &str,
    raw: Option<&str>,
) -> AppResult<Option<T>> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: String| AppError::BadRequest(format!("{field}: {e}"))),
    }
}
