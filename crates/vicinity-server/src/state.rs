use std::sync::Arc;

use vicinity_core::GeofenceRegistry;
use vicinity_engine::{ChannelLocationProvider, TrackingController};

use crate::config::Config;
use crate::middleware::RateLimiter;
use crate::notifier::AppNotifier;

pub type Controller = TrackingController<ChannelLocationProvider, AppNotifier>;

const FIX_BUFFER: usize = 64;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<GeofenceRegistry>,
    pub provider: Arc<ChannelLocationProvider>,
    pub controller: Arc<Controller>,
    pub fix_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(GeofenceRegistry::new());
        let provider = Arc::new(ChannelLocationProvider::new(FIX_BUFFER));
        let notifier = Arc::new(AppNotifier::from_url(config.notify_url.as_deref()));
        let controller = Arc::new(TrackingController::new(
            registry.clone(),
            provider.clone(),
            notifier,
            config.engine.clone(),
        ));

        Self {
            registry,
            provider,
            controller,
            fix_limiter: Arc::new(RateLimiter::for_fixes(config.fix_rate_limit_per_sec)),
        }
    }
}
