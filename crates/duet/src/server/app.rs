use std::future::Future;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use duet_models::ServerConfig;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::routes::{events, health, memory};
use super::state::AppState;

/// Router with every route, tracing and permissive CORS.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/memory/stats", get(health::stats))
        .route("/api/market/{instrument_id}", get(memory::get_market_data))
        .route("/api/agents/{agent_id}/decision", get(memory::get_agent_decision))
        .route("/api/signals", get(memory::get_active_signals))
        .route("/api/signals/{signal_id}", get(memory::get_trading_signal))
        .route("/api/state/{component}", get(memory::get_system_state))
        .route("/api/events", get(events::get_events).post(events::publish_event))
        .route("/api/events/pending", get(events::get_pending_events))
        .route("/api/events/{event_id}/processed", post(events::mark_processed))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "REST facade listening");
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown)
        .await
}
