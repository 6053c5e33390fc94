//! Vicinity Server - HTTP adapter for the proximity reminder engine.

pub mod config;
pub mod middleware;
pub mod notifier;
pub mod routes;
pub mod state;

pub use config::Config;
pub use notifier::AppNotifier;
pub use routes::create_router;
pub use state::AppState;
