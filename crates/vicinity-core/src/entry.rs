use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Identifier of a geofence, equal to the identifier of its reminder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Whether the device is currently considered inside a geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipState {
    #[default]
    Outside,
    Inside,
}

/// A circular trigger region attached to a reminder.
///
/// `membership_state` and `last_transition_at` are derived state: they are
/// only changed by the registry when it applies evaluation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEntry {
    pub id: EntryId,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub center: Coordinate,
    pub radius_meters: f64,
    pub active: bool,
    #[serde(default)]
    pub membership_state: MembershipState,
    #[serde(default)]
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl GeofenceEntry {
    /// Create an active entry in the `Outside` state.
    pub fn new(
        id: impl Into<EntryId>,
        title: impl Into<String>,
        center: Coordinate,
        radius_meters: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: None,
            center,
            radius_meters,
            active: true,
            membership_state: MembershipState::Outside,
            last_transition_at: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// True if center and radius are identical to `other`'s.
    pub fn same_geometry(&self, other: &GeofenceEntry) -> bool {
        self.center == other.center && self.radius_meters == other.radius_meters
    }

    pub fn is_inside(&self) -> bool {
        self.membership_state == MembershipState::Inside
    }
}

/// Radius choices offered by the reminder editor.
///
/// Only used to produce a `radius_meters` value; the registry stores the
/// plain number and accepts any positive radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityPreset {
    OneMeter,
    TenMeters,
    TwentyFiveMeters,
    FiftyMeters,
}

impl ProximityPreset {
    pub const ALL: [ProximityPreset; 4] = [
        ProximityPreset::OneMeter,
        ProximityPreset::TenMeters,
        ProximityPreset::TwentyFiveMeters,
        ProximityPreset::FiftyMeters,
    ];

    pub fn meters(self) -> f64 {
        match self {
            ProximityPreset::OneMeter => 1.0,
            ProximityPreset::TenMeters => 10.0,
            ProximityPreset::TwentyFiveMeters => 25.0,
            ProximityPreset::FiftyMeters => 50.0,
        }
    }
}

impl From<ProximityPreset> for f64 {
    fn from(preset: ProximityPreset) -> Self {
        preset.meters()
    }
}
