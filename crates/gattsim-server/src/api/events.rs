//! Domain event log API endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::state::{RecordedEvent, SharedState, EVENT_LOG_CAPACITY};

/// Events returned when no limit is given.
const DEFAULT_LIMIT: usize = 50;

/// Creates the events router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(list_events))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for the event log.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Maximum number of events, newest kept. Capped at the log capacity.
    #[param(example = 50)]
    pub limit: Option<usize>,
}

/// Recent domain events.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventsResponse {
    /// Events, oldest first.
    pub events: Vec<RecordedEvent>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List recent domain events.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    operation_id = "listEvents",
    summary = "List recent domain events",
    description = "Returns the most recent events the peripheral published: \
        subscription changes, connections, value updates, writes and failures.",
    params(EventsQuery),
    responses(
        (status = 200, description = "Events listed", body = EventsResponse)
    )
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIMIT)
        .min(EVENT_LOG_CAPACITY);
    Json(EventsResponse {
        events: state.recent_events(limit).await,
    })
}
