use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use vicinity_core::EntryId;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/geofences", get(list_geofences))
        .route("/api/geofences/{id}", get(get_geofence))
        .route("/api/geofences/{id}/active", put(set_active))
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    active: bool,
}

/// GET /api/geofences - All geofences, including inactive ones.
async fn list_geofences(State(state): State<AppState>) -> Response {
    Json(state.registry.all()).into_response()
}

async fn get_geofence(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&EntryId::new(id)) {
        Some(entry) => Json(entry).into_response(),
        None => (StatusCode::NOT_FOUND, "Geofence not found").into_response(),
    }
}

/// PUT /api/geofences/{id}/active - Enable or disable evaluation of a geofence.
async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> Response {
    let id = EntryId::new(id);
    if !state.registry.set_active(&id, req.active) {
        return (StatusCode::NOT_FOUND, "Geofence not found").into_response();
    }

    match state.registry.get(&id) {
        Some(entry) => Json(entry).into_response(),
        // Deleted between the two calls
        None => (StatusCode::NOT_FOUND, "Geofence not found").into_response(),
    }
}
