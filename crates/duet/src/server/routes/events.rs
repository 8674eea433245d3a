//! Cross-framework event relay.
//!
//! `GET /api/events` reads the short-lived cache queue; `GET /api/events/pending`
//! reads the durable relay, whose entries stay until marked processed.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use duet_models::{CrossFrameworkEvent, Framework};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::parse_opt;
use crate::server::error::{AppError, AppResult};
use crate::server::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TargetQuery {
    /// `agent`, `trading` or `shared`; absent means broadcast.
    pub target: Option<String>,
}

impl TargetQuery {
    fn target(&self) -> AppResult<Option<Framework>> {
        parse_opt("target", self.target.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub event_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub source: Framework,
    #[serde(default)]
    pub target: Option<Framework>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<CrossFrameworkEvent>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ProcessedResponse {
    pub id: String,
    pub processed: bool,
}

fn listing(events: Vec<CrossFrameworkEvent>) -> Json<EventsResponse> {
    Json(EventsResponse {
        total: events.len(),
        events,
    })
}

/// `GET /api/events?target=`
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> AppResult<Json<EventsResponse>> {
    let target = query.target()?;
    let events = state.run(move |memory| memory.get_events(target)).await?;
    Ok(listing(events))
}

/// `POST /api/events`
pub async fn publish_event(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> AppResult<(StatusCode, Json<PublishResponse>)> {
    let id = state
        .run(move |memory| {
            memory.publish_event(&request.event_type, request.data, request.source, request.target)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(PublishResponse { id })))
}

/// `GET /api/events/pending?target=`
pub async fn get_pending_events(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> AppResult<Json<EventsResponse>> {
    let target = query.target()?;
    let events = state
        .run(move |memory| memory.get_unprocessed_events(target))
        .await?;
    Ok(listing(events))
}

/// `POST /api/events/{event_id}/processed`
pub async fn mark_processed(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<ProcessedResponse>> {
    let id = event_id.clone();
    let exists = state
        .run(move |memory| memory.mark_event_processed(&id))
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("event {event_id}")));
    }
    Ok(Json(ProcessedResponse {
        id: event_id,
        processed: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_memory::UnifiedMemory;
    use duet_models::MemoryConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> AppState {
        let memory = UnifiedMemory::in_memory(MemoryConfig::default()).unwrap();
        AppState::new(Arc::new(memory))
    }

    fn target(raw: Option<&str>) -> Query<TargetQuery> {
        Query(TargetQuery {
            target: raw.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn publish_then_read_both_relays() {
        let state = state();
        let request: PublishRequest = serde_json::from_value(json!({
            "event_type": "rebalance",
            "data": {"weight": 0.5},
            "source": "agent",
            "target": "trading"
        }))
        .unwrap();

        let (status, Json(published)) = publish_event(State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(cached) = get_events(State(state.clone()), target(Some("trading")))
            .await
            .unwrap();
        assert_eq!(cached.total, 1);
        assert_eq!(cached.events[0].id, published.id);

        let Json(pending) = get_pending_events(State(state.clone()), target(Some("trading")))
            .await
            .unwrap();
        assert_eq!(pending.events[0].id, published.id);

        let Json(marked) = mark_processed(State(state.clone()), Path(published.id.clone()))
            .await
            .unwrap();
        assert!(marked.processed);

        let Json(pending) = get_pending_events(State(state), target(Some("trading")))
            .await
            .unwrap();
        assert_eq!(pending.total, 0);
    }

    #[tokio::test]
    async fn unknown_event_is_404() {
        let err = mark_processed(State(state()), Path("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_target_is_400() {
        let err = get_events(State(state()), target(Some("crew")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_event_type_is_400() {
        let request = PublishRequest {
            event_type: " ".into(),
            data: Map::new(),
            source: Framework::Shared,
            target: None,
        };
        let err = publish_event(State(state()), Json(request)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
