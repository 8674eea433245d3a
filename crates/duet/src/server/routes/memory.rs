//! Read-only entity lookups.
//!
//! Every lookup takes an optional `placement` query value
//! (`persistent`, `cache` or `both`); entity reads default to `both`.

use axum::extract::{Path, Query, State};
use axum::Json;
use duet_models::{
    AgentDecisionRecord, MarketDataRecord, Placement, SystemStateRecord, TradingSignalRecord,
};
use serde::{Deserialize, Serialize};

use super::parse_or;
use crate::server::error::{AppError, AppResult};
use crate::server::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LookupQuery {
    pub data_type: Option<String>,
    pub decision_type: Option<String>,
    pub placement: Option<String>,
}

impl LookupQuery {
    fn placement(&self) -> AppResult<Placement> {
        parse_or("placement", self.placement.as_deref(), Placement::Both)
    }
}

#[derive(Debug, Serialize)]
pub struct ActiveSignalsResponse {
    pub signals: Vec<String>,
    pub total: usize,
}

fn found<T>(value: Option<T>, what: String) -> AppResult<Json<T>> {
    value.map(Json).ok_or(AppError::NotFound(what))
}

/// `GET /api/market/{instrument_id}?data_type=&placement=`
pub async fn get_market_data(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<MarketDataRecord>> {
    let placement = query.placement()?;
    let what = format!("market data for {instrument_id}");
    let data_type = query.data_type;
    let record = state
        .run(move |memory| memory.get_market_data(&instrument_id, data_type.as_deref(), placement))
        .await?;
    found(record, what)
}

/// `GET /api/agents/{agent_id}/decision?decision_type=&placement=`
pub async fn get_agent_decision(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<AgentDecisionRecord>> {
    let placement = query.placement()?;
    let what = format!("decision for agent {agent_id}");
    let decision_type = query.decision_type;
    let record = state
        .run(move |memory| {
            memory.get_agent_decision(&agent_id, decision_type.as_deref(), placement)
        })
        .await?;
    found(record, what)
}

/// `GET /api/signals`
pub async fn get_active_signals(
    State(state): State<AppState>,
) -> AppResult<Json<ActiveSignalsResponse>> {
    let signals = state.run(|memory| memory.get_active_signals()).await?;
    Ok(Json(ActiveSignalsResponse {
        total: signals.len(),
        signals,
    }))
}

/// `GET /api/signals/{signal_id}?placement=`
pub async fn get_trading_signal(
    State(state): State<AppState>,
    Path(signal_id): Path<String>,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<TradingSignalRecord>> {
    let placement = query.placement()?;
    let what = format!("signal {signal_id}");
    let record = state
        .run(move |memory| memory.get_trading_signal(&signal_id, placement))
        .await?;
    found(record, what)
}

/// `GET /api/state/{component}`
pub async fn get_system_state(
    State(state): State<AppState>,
    Path(component): Path<String>,
) -> AppResult<Json<SystemStateRecord>> {
    let what = format!("state for {component}");
    let record = state
        .run(move |memory| memory.get_system_state(&component))
        .await?;
    found(record, what)
}
