//! Vicinity Engine - Tracking pipeline, notification dispatch and delivery.

pub mod controller;
pub mod delivery;
pub mod dispatcher;
pub mod filter;
pub mod location;
pub mod notifier;

pub use controller::{
    PipelineStats, StopReason, TrackingController, TrackingError, TrackingState, TrackingStatus,
};
pub use delivery::{DeliveryOutcome, DeliveryReport, DeliveryWorker};
pub use dispatcher::{DispatchResult, NotificationDispatcher, SuppressReason, TokenBucket};
pub use filter::{FixDecision, FixFilter};
pub use location::{ChannelLocationProvider, LocationError, LocationProvider, LocationUpdate};
pub use notifier::{DeliveryError, LogNotifier, NotificationRequest, Notifier, WebhookNotifier};

#[cfg(any(test, feature = "test-utils"))]
pub use notifier::memory::RecordingNotifier;
