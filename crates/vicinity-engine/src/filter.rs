use chrono::{DateTime, Utc};

use vicinity_core::{EngineConfig, PositionFix};

/// Whether a fix should be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixDecision {
    Accept,
    /// Arrived too soon after the last evaluated fix without moving far enough.
    TooSoon,
    /// Older than the last evaluated fix.
    Stale,
}

/// Throttles evaluation to at most one fix per interval unless the device
/// moved at least the minimum displacement. Measured on fix timestamps.
#[derive(Debug)]
pub struct FixFilter {
    min_interval: chrono::Duration,
    min_displacement_meters: f64,
    last: Option<PositionFix>,
}

impl FixFilter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_interval: chrono::Duration::from_std(config.min_fix_interval())
                .unwrap_or_else(|_| chrono::Duration::weeks(52)),
            min_displacement_meters: config.min_displacement_meters,
            last: None,
        }
    }

    /// Decide on `fix`, remembering it when accepted.
    pub fn check(&mut self, fix: &PositionFix) -> FixDecision {
        let decision = match &self.last {
            None => FixDecision::Accept,
            Some(last) if fix.timestamp < last.timestamp => FixDecision::Stale,
            Some(last) => {
                let elapsed = fix.timestamp - last.timestamp;
                let moved = last.coordinate().distance_to(&fix.coordinate());
                if elapsed < self.min_interval && moved < self.min_displacement_meters {
                    FixDecision::TooSoon
                } else {
                    FixDecision::Accept
                }
            }
        };

        if decision == FixDecision::Accept {
            self.last = Some(*fix);
        }
        decision
    }

    /// Timestamp of the last evaluated fix.
    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.last.map(|f| f.timestamp)
    }
}
