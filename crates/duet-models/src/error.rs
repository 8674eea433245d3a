use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification shared by every error type in the workspace.
///
/// Lets callers tell a backend outage from bad data or bad input without
/// matching on each crate's error enum. "Not found" is not an error anywhere:
/// lookups return `Ok(None)` or an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A store could not be reached or failed mid-operation.
    Unavailable,
    /// Stored data could not be decoded.
    Malformed,
    /// The caller passed something the operation rejects.
    InvalidInput,
    /// Configuration rejected at construction.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Malformed => "malformed",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Config => "config",
        };
        f.write_str(s)
    }
}
