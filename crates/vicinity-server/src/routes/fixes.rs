use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use vicinity_core::{PositionFix, RawFix};
use vicinity_engine::LocationError;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/fixes", post(post_fix))
}

/// POST /api/fixes - Feed a position fix into the tracking pipeline.
async fn post_fix(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(raw): Json<RawFix>,
) -> Response {
    if let Err(wait_time) = state.fix_limiter.check(addr.ip()) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            format!("Rate limited. Try again in {:?}", wait_time),
        )
            .into_response();
    }

    // The pipeline drops malformed fixes silently; tell HTTP clients instead
    if let Err(e) = PositionFix::try_from(raw.clone()) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Validation error: {}", e),
        )
            .into_response();
    }

    match state.provider.publish(raw) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(LocationError::NotSubscribed) => {
            (StatusCode::CONFLICT, "Tracking is not running").into_response()
        }
        Err(LocationError::BufferFull) => {
            tracing::warn!("Fix buffer full, dropping fix from {}", addr.ip());
            (StatusCode::SERVICE_UNAVAILABLE, "Fix buffer full").into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
