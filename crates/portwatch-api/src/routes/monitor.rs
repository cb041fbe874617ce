use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use portwatch_core::TransitionEvent;

use crate::state::AppState;

#[derive(Serialize)]
pub struct MonitorStatus {
    pub id: Uuid,
    pub state: String,
    pub created_at: String,
    pub last_checked: Option<String>,
    pub tick_count: u64,
    pub check_duration_secs: u64,
    pub probe_timeout_ms: u64,
    pub endpoint_count: Option<usize>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub monitor_id: Uuid,
    pub events: Vec<TransitionEvent>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/monitor", get(get_status))
        .route("/monitor/events", get(get_events))
}

/// GET /api/v1/monitor
async fn get_status(State(state): State<AppState>) -> Json<MonitorStatus> {
    let m = &state.monitor;
    let endpoint_count = m.registry().list_all().await.ok().map(|e| e.len());

    Json(MonitorStatus {
        id: m.id(),
        state: m.state().await.to_string(),
        created_at: m.created_at().to_rfc3339(),
        last_checked: m.last_checked().await.map(|t| t.to_rfc3339()),
        tick_count: m.tick_count(),
        check_duration_secs: m.config().check_duration.as_secs(),
        probe_timeout_ms: m.config().probe_timeout.as_millis() as u64,
        endpoint_count,
    })
}

/// GET /api/v1/monitor/events
async fn get_events(State(state): State<AppState>) -> Json<EventsResponse> {
    Json(EventsResponse {
        monitor_id: state.monitor.id(),
        events: state.monitor.recent_events().await,
    })
}
