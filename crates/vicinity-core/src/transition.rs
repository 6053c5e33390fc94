use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::EntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    Entered,
    Exited,
}

/// Diagnostic information attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// The fix accuracy exceeded the geofence radius.
    pub low_confidence: bool,
    pub accuracy_meters: f64,
}

/// A membership change produced by one evaluation pass.
///
/// Consumed once by the dispatcher; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub entry_id: EntryId,
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
    pub distance_meters: f64,
    pub title: String,
    pub category: Option<String>,
    pub radius_meters: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl TransitionEvent {
    pub fn is_entered(&self) -> bool {
        self.kind == TransitionKind::Entered
    }

    pub fn is_low_confidence(&self) -> bool {
        self.diagnostics.is_some_and(|d| d.low_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(kind: TransitionKind, diagnostics: Option<Diagnostics>) -> TransitionEvent {
        TransitionEvent {
            entry_id: EntryId::new("r1"),
            kind,
            at: Utc::now(),
            distance_meters: 8.0,
            title: "Buy milk".to_string(),
            category: None,
            radius_meters: 10.0,
            diagnostics,
        }
    }

    #[test]
    fn test_is_entered() {
        assert!(make_event(TransitionKind::Entered, None).is_entered());
        assert!(!make_event(TransitionKind::Exited, None).is_entered());
    }

    #[test]
    fn test_low_confidence_flag() {
        let plain = make_event(TransitionKind::Entered, None);
        assert!(!plain.is_low_confidence());

        let flagged = make_event(
            TransitionKind::Entered,
            Some(Diagnostics {
                low_confidence: true,
                accuracy_meters: 40.0,
            }),
        );
        assert!(flagged.is_low_confidence());
    }

    #[test]
    fn test_serializes_kind_upper_case() {
        let json = serde_json::to_value(make_event(TransitionKind::Exited, None)).unwrap();
        assert_eq!(json["kind"], "EXITED");
        assert_eq!(json["entry_id"], "r1");
        assert!(json.get("diagnostics").is_none());
    }
}
