use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use portwatch_core::Endpoint;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateEndpointRequest {
    pub display_name: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
}

#[derive(Serialize)]
pub struct EndpointsResponse {
    pub endpoints: Vec<Endpoint>,
}

#[derive(Serialize)]
pub struct DeleteEndpointResponse {
    pub message: String,
    pub display_name: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/endpoints", get(list_endpoints).post(create_endpoint))
        .route("/endpoints/{name}", get(get_endpoint).delete(delete_endpoint))
}

/// POST /api/v1/endpoints
async fn create_endpoint(
    State(state): State<AppState>,
    Json(body): Json<CreateEndpointRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(display_name), Some(hostname)) = (body.display_name, body.hostname) else {
        return Err(ApiError::BadRequest(
            "You must specify all required details first!".into(),
        ));
    };

    let endpoint = state
        .registry()
        .add(&display_name, &hostname, body.port)
        .await?;

    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// GET /api/v1/endpoints
async fn list_endpoints(
    State(state): State<AppState>,
) -> Result<Json<EndpointsResponse>, ApiError> {
    let endpoints = state.registry().list_all().await?;
    Ok(Json(EndpointsResponse { endpoints }))
}

/// GET /api/v1/endpoints/:name
async fn get_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.registry().find_by_name(&name).await?))
}

/// DELETE /api/v1/endpoints/:name
async fn delete_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteEndpointResponse>, ApiError> {
    state.registry().remove(&name).await?;
    Ok(Json(DeleteEndpointResponse {
        message: "Endpoint removed".into(),
        display_name: name,
    }))
}
