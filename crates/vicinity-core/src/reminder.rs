use serde::{Deserialize, Serialize};

use crate::entry::{EntryId, GeofenceEntry, ProximityPreset};
use crate::geo::Coordinate;

/// Location assignment of a reminder.
///
/// The radius is either explicit or one of the editor presets. An explicit
/// `radius_meters` wins when both are present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReminderLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub proximity: Option<ProximityPreset>,
}

impl ReminderLocation {
    /// Radius in meters. NaN when neither form is given, which validation rejects.
    pub fn radius(&self) -> f64 {
        self.radius_meters
            .or(self.proximity.map(ProximityPreset::meters))
            .unwrap_or(f64::NAN)
    }
}

/// A reminder document as published by the reminder store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub location: Option<ReminderLocation>,
}

impl Reminder {
    /// The geofence this reminder describes, if it has a location.
    pub fn to_entry(&self) -> Option<GeofenceEntry> {
        let location = self.location?;
        Some(GeofenceEntry {
            category: self.category.clone(),
            ..GeofenceEntry::new(
                EntryId::new(self.id.clone()),
                self.title.clone(),
                Coordinate::new(location.latitude, location.longitude),
                location.radius(),
            )
            .with_active(self.active)
        })
    }
}

/// Change notification emitted by the reminder store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderEvent {
    Created(Reminder),
    Updated(Reminder),
    Deleted { id: String },
}

impl ReminderEvent {
    pub fn reminder_id(&self) -> &str {
        match self {
            ReminderEvent::Created(r) | ReminderEvent::Updated(r) => &r.id,
            ReminderEvent::Deleted { id } => id,
        }
    }
}
