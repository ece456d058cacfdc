//! HTTP route handlers.
//!
//! All handlers are thin - group coordination lives in the actors and
//! media bytes are served straight off disk.

use axum::{
    extract::{Path, State},
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{ChorusError, ChorusResult};
use crate::protocol_constants::SERVICE_ID;

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Browser clients are served from arbitrary origins on the LAN.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/groups", get(list_groups))
        .route("/api/groups/{id}", get(get_group))
        .route("/api/tracks", get(list_tracks))
        .route("/ws", get(ws_handler))
        .nest_service("/media", ServeDir::new(state.library.root()))
        .layer(cors)
        .with_state(state)
}

/// Liveness probe: "Is the process running?"
async fn health_check(
    State(state): State<AppState>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "connections": state.ws_manager.connection_count(),
    }))
}

/// Returns every live group with its roster and playback state.
async fn list_groups(
    State(state): State<AppState>,
) -> impl IntoResponse {
    let groups = state.groups.snapshots().await;
    Json(json!({ "groups": groups }))
}

/// Returns a single group's roster and playback state, or 404 if the
/// group has no live members.
async fn get_group(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ChorusResult<impl IntoResponse> {
    let snapshot = state
        .groups
        .snapshot(&id)
        .await
        .ok_or(ChorusError::GroupNotFound(id))?;
    Ok(Json(snapshot))
}

/// Returns the current media library listing.
async fn list_tracks(
    State(state): State<AppState>,
) -> ChorusResult<impl IntoResponse> {
    let tracks = state.library.list().await?;
    Ok(Json(json!({ "tracks": tracks })))
}
