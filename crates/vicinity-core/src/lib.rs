//! Vicinity Core - Geofence domain model, geometry and evaluation.
//!
//! This crate holds the pure parts of the proximity reminder engine: the
//! geofence registry, the haversine evaluator and the types exchanged with
//! the reminder store and location provider. It performs no I/O.

pub mod config;
pub mod entry;
pub mod error;
pub mod evaluator;
pub mod fix;
pub mod geo;
pub mod registry;
pub mod reminder;
pub mod transition;
pub mod validation;

// Re-exports for convenience
pub use config::EngineConfig;
pub use entry::{EntryId, GeofenceEntry, MembershipState, ProximityPreset};
pub use error::{CoreError, ValidationError};
pub use evaluator::ProximityEvaluator;
pub use fix::{PositionFix, RawFix};
pub use geo::{haversine_distance, Coordinate, EARTH_RADIUS_METERS};
pub use registry::{GeofenceRegistry, SyncOutcome, UpsertOutcome};
pub use reminder::{Reminder, ReminderEvent, ReminderLocation};
pub use transition::{Diagnostics, TransitionEvent, TransitionKind};
pub use validation::Validator;
