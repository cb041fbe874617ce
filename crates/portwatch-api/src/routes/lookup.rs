use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiError;
use crate::lookup::{AddressFamily, LookupResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/lookup", get(lookup))
}

/// GET /api/v1/lookup?host=..&port=..
async fn lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<LookupResult>, ApiError> {
    let host = query.host.as_deref().map(str::trim).unwrap_or_default();
    if host.is_empty() {
        return Err(ApiError::BadRequest(
            "You must specify an IP address first!".into(),
        ));
    }
    if query.port == Some(0) {
        return Err(ApiError::BadRequest("port must be between 1 and 65535".into()));
    }
    let family = AddressFamily::classify(host)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid host: {}", host)))?;

    Ok(Json(state.lookup.run(host, query.port, family).await))
}
