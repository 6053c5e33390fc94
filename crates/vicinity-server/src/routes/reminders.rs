use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use vicinity_core::{ReminderEvent, SyncOutcome, UpsertOutcome};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/reminders/events", post(apply_event))
}

#[derive(Serialize)]
struct SyncResponse {
    id: String,
    outcome: &'static str,
}

fn outcome_label(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Upserted(UpsertOutcome::Inserted) => "inserted",
        SyncOutcome::Upserted(UpsertOutcome::Preserved) => "updated",
        SyncOutcome::Upserted(UpsertOutcome::Reset) => "reset",
        SyncOutcome::Removed => "removed",
        SyncOutcome::Unchanged => "unchanged",
    }
}

/// POST /api/reminders/events - Apply a reminder store change to the registry.
async fn apply_event(State(state): State<AppState>, Json(event): Json<ReminderEvent>) -> Response {
    match state.registry.sync(&event) {
        Ok(outcome) => {
            tracing::debug!(id = event.reminder_id(), ?outcome, "Applied reminder event");
            Json(SyncResponse {
                id: event.reminder_id().to_string(),
                outcome: outcome_label(outcome),
            })
            .into_response()
        }
        Err(e) => {
            tracing::warn!(id = event.reminder_id(), "Rejected reminder event: {}", e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Validation error: {}", e),
            )
                .into_response()
        }
    }
}
