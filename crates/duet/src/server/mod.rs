//! REST facade over the unified memory.

pub mod app;
pub mod error;
pub mod routes;
pub mod state;

pub use app::{create_app, serve};
pub use error::{AppError, AppResult};
pub use state::AppState;
