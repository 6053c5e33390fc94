use crate::entry::{GeofenceEntry, MembershipState};
use crate::fix::PositionFix;
use crate::geo::haversine_distance;
use crate::transition::{Diagnostics, TransitionEvent, TransitionKind};

/// Computes membership transitions for a position fix.
///
/// Entry uses the bare radius (`distance <= radius`). Exit requires the fix
/// to be past `radius + exit_margin_meters`, so a device hovering on the
/// boundary cannot produce ENTERED/EXITED pairs from GPS noise.
///
/// The evaluator has no state of its own and performs no I/O; the current
/// membership of each entry is read from the entries passed in.
#[derive(Debug, Clone, Copy)]
pub struct ProximityEvaluator {
    exit_margin_meters: f64,
}

impl ProximityEvaluator {
    pub fn new(exit_margin_meters: f64) -> Self {
        Self {
            exit_margin_meters: exit_margin_meters.max(0.0),
        }
    }

    pub fn exit_margin_meters(&self) -> f64 {
        self.exit_margin_meters
    }

    /// Evaluate `fix` against `entries`, returning one event per entry whose
    /// membership changes. Inactive entries are skipped.
    pub fn evaluate(&self, fix: &PositionFix, entries: &[GeofenceEntry]) -> Vec<TransitionEvent> {
        let position = fix.coordinate();

        entries
            .iter()
            .filter(|entry| entry.active)
            .filter_map(|entry| {
                let distance = haversine_distance(position, entry.center);
                let kind = self.transition_for(entry, distance)?;

                Some(TransitionEvent {
                    entry_id: entry.id.clone(),
                    kind,
                    at: fix.timestamp,
                    distance_meters: distance,
                    title: entry.title.clone(),
                    category: entry.category.clone(),
                    radius_meters: entry.radius_meters,
                    diagnostics: Some(Diagnostics {
                        low_confidence: fix.accuracy_meters > entry.radius_meters,
                        accuracy_meters: fix.accuracy_meters,
                    }),
                })
            })
            .collect()
    }

    fn transition_for(&self, entry: &GeofenceEntry, distance: f64) -> Option<TransitionKind> {
        match entry.membership_state {
            MembershipState::Outside if distance <= entry.radius_meters => {
                Some(TransitionKind::Entered)
            }
            MembershipState::Inside if distance > entry.radius_meters + self.exit_margin_meters => {
                Some(TransitionKind::Exited)
            }
            _ => None,
        }
    }
}

impl Default for ProximityEvaluator {
    fn default() -> Self {
        Self::new(5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use chrono::{Duration, TimeZone, Utc};

    fn center() -> Coordinate {
        Coordinate::new(1.0, 1.0)
    }

    fn entry(id: &str, radius: f64) -> GeofenceEntry {
        GeofenceEntry::new(id, format!("Reminder {}", id), center(), radius)
    }

    fn fix_at(distance: f64, accuracy: f64, seq: i64) -> PositionFix {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        PositionFix::at(
            center().destination(90.0, distance),
            accuracy,
            t0 + Duration::seconds(seq * 20),
        )
    }

    /// Run fixes through the evaluator, applying each transition the way the
    /// registry does.
    fn run(evaluator: &ProximityEvaluator, mut e: GeofenceEntry, distances: &[f64]) -> Vec<Vec<TransitionKind>> {
        let mut out = Vec::new();
        for (i, d) in distances.iter().enumerate() {
            let events = evaluator.evaluate(&fix_at(*d, 5.0, i as i64), std::slice::from_ref(&e));
            for ev in &events {
                e.membership_state = match ev.kind {
                    TransitionKind::Entered => MembershipState::Inside,
                    TransitionKind::Exited => MembershipState::Outside,
                };
            }
            out.push(events.into_iter().map(|ev| ev.kind).collect());
        }
        out
    }

    #[test]
    fn test_enter_stay_exit_sequence() {
        let evaluator = ProximityEvaluator::default();
        let kinds = run(&evaluator, entry("r1", 10.0), &[50.0, 8.0, 8.0, 50.0]);

        assert_eq!(
            kinds,
            vec![
                vec![],
                vec![TransitionKind::Entered],
                vec![],
                vec![TransitionKind::Exited],
            ]
        );
    }

    #[test]
    fn test_boundary_jitter_fires_once() {
        let evaluator = ProximityEvaluator::new(5.0);
        let distances = [10.2, 9.8, 10.2, 9.8, 10.2, 9.8, 14.9, 9.8];
        let kinds = run(&evaluator, entry("r1", 10.0), &distances);

        let entered = kinds
            .iter()
            .flatten()
            .filter(|k| **k == TransitionKind::Entered)
            .count();
        let exited = kinds
            .iter()
            .flatten()
            .filter(|k| **k == TransitionKind::Exited)
            .count();
        assert_eq!(entered, 1);
        assert_eq!(exited, 0);
    }

    #[test]
    fn test_exit_requires_margin() {
        let evaluator = ProximityEvaluator::new(5.0);
        let kinds = run(&evaluator, entry("r1", 10.0), &[5.0, 14.9, 15.5, 5.0]);

        assert_eq!(
            kinds,
            vec![
                vec![TransitionKind::Entered],
                vec![],
                vec![TransitionKind::Exited],
                vec![TransitionKind::Entered],
            ]
        );
    }

    #[test]
    fn test_far_fixes_never_enter() {
        let evaluator = ProximityEvaluator::new(5.0);
        let distances = [15.01, 20.0, 100.0, 1_000.0, 15.5];
        let kinds = run(&evaluator, entry("r1", 10.0), &distances);
        assert!(kinds.iter().all(|k| k.is_empty()));
    }

    #[test]
    fn test_fix_at_center_enters_any_radius() {
        let evaluator = ProximityEvaluator::default();
        let tiny = GeofenceEntry::new("r1", "tiny", center(), f64::MIN_POSITIVE);
        let fix = PositionFix::at(center(), 1.0, Utc::now());

        let events = evaluator.evaluate(&fix, &[tiny]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].distance_meters, 0.0);
    }

    #[test]
    fn test_inactive_entries_skipped() {
        let evaluator = ProximityEvaluator::default();
        let inactive = entry("r1", 10.0).with_active(false);
        let events = evaluator.evaluate(&fix_at(1.0, 5.0, 0), &[inactive]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_low_accuracy_flagged_but_evaluated() {
        let evaluator = ProximityEvaluator::default();
        let events = evaluator.evaluate(&fix_at(8.0, 40.0, 0), &[entry("r1", 10.0)]);

        assert_eq!(events.len(), 1);
        assert!(events[0].is_low_confidence());
        assert_eq!(events[0].diagnostics.unwrap().accuracy_meters, 40.0);

        let events = evaluator.evaluate(&fix_at(8.0, 5.0, 0), &[entry("r1", 10.0)]);
        assert!(!events[0].is_low_confidence());
    }

    #[test]
    fn test_event_fields() {
        let evaluator = ProximityEvaluator::default();
        let fix = fix_at(8.0, 5.0, 3);
        let e = entry("r1", 10.0).with_category("groceries");
        let events = evaluator.evaluate(&fix, &[e]);

        let ev = &events[0];
        assert_eq!(ev.entry_id.as_str(), "r1");
        assert_eq!(ev.at, fix.timestamp);
        assert!((ev.distance_meters - 8.0).abs() < 1e-6);
        assert_eq!(ev.radius_meters, 10.0);
        assert_eq!(ev.category.as_deref(), Some("groceries"));
        assert_eq!(ev.title, "Reminder r1");
    }

    #[test]
    fn test_multiple_entries_evaluated_independently() {
        let evaluator = ProximityEvaluator::default();
        let near = entry("a", 25.0);
        let far = GeofenceEntry::new("b", "far", Coordinate::new(10.0, 10.0), 50.0);
        let mut inside = entry("c", 25.0);
        inside.membership_state = MembershipState::Inside;

        let events = evaluator.evaluate(&fix_at(20.0, 5.0, 0), &[near, far, inside]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entry_id.as_str(), "a");
        assert_eq!(events[0].kind, TransitionKind::Entered);
    }

    #[test]
    fn test_near_pole_evaluation() {
        let evaluator = ProximityEvaluator::default();
        let pole = GeofenceEntry::new("p", "Station", Coordinate::new(89.9999, 0.0), 25.0);
        // Across the pole, ~22 m away despite a 180 degree longitude difference
        let fix = PositionFix::new(89.9999, 180.0, 3.0, Utc::now());
        let events = evaluator.evaluate(&fix, &[pole]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TransitionKind::Entered);
    }
}
