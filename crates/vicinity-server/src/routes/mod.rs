pub mod fixes;
pub mod geofences;
pub mod health;
pub mod reminders;
pub mod tracking;

use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(reminders::routes())
        .merge(geofences::routes())
        .merge(fixes::routes())
        .merge(tracking::routes())
        .with_state(state)
}
