use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use vicinity_engine::TrackingError;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tracking", get(get_status))
        .route("/api/tracking/start", post(start))
        .route("/api/tracking/stop", post(stop))
}

/// GET /api/tracking - Tracking state, last fix and pipeline counters.
async fn get_status(State(state): State<AppState>) -> Response {
    Json(state.controller.current_status()).into_response()
}

async fn start(State(state): State<AppState>) -> Response {
    match state.controller.start().await {
        Ok(()) => Json(state.controller.current_status()).into_response(),
        Err(TrackingError::AlreadyStarted) => {
            (StatusCode::CONFLICT, "Tracking already started").into_response()
        }
        Err(e) => {
            tracing::error!("Failed to start tracking: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

/// POST /api/tracking/stop - Idempotent.
async fn stop(State(state): State<AppState>) -> Response {
    state.controller.stop().await;
    Json(state.controller.current_status()).into_response()
}
