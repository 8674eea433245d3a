use axum::extract::State;
use axum::Json;
use duet_memory::MemoryStats;
use serde::Serialize;

use crate::server::error::AppResult;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub running: bool,
    pub cache_backend: &'static str,
    pub uptime_secs: u64,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let memory = state.memory();
    Json(HealthResponse {
        status: "healthy",
        running: memory.is_running(),
        cache_backend: memory.cache().backend_name(),
        uptime_secs: state.uptime_secs(),
    })
}

/// `GET /api/memory/stats`
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<MemoryStats>> {
    state.run(|memory| memory.stats()).await.map(Json)
}
