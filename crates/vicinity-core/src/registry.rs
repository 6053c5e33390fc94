use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::entry::{EntryId, GeofenceEntry, MembershipState};
use crate::error::ValidationError;
use crate::evaluator::ProximityEvaluator;
use crate::fix::PositionFix;
use crate::reminder::ReminderEvent;
use crate::transition::{TransitionEvent, TransitionKind};
use crate::validation::Validator;

/// Result of inserting or replacing an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Geometry unchanged; membership carried over from the prior entry.
    Preserved,
    /// Center or radius changed; membership reset to `Outside`.
    Reset,
}

/// What a reminder store event did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Upserted(UpsertOutcome),
    Removed,
    /// The reminder has no location and no entry existed.
    Unchanged,
}

/// The set of geofences eligible for proximity evaluation.
///
/// Entries are kept ordered by id. Every operation takes the same lock, so
/// CRUD updates never interleave with a snapshot or an evaluation pass.
/// Unknown ids passed to `remove` or `set_active` are ignored: deletes
/// racing with other store events are expected.
#[derive(Debug, Default)]
pub struct GeofenceRegistry {
    entries: Mutex<BTreeMap<EntryId, GeofenceEntry>>,
}

impl GeofenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<EntryId, GeofenceEntry>> {
        // Entries are plain data; a panic elsewhere cannot leave them half-written
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for `entry.id`.
    ///
    /// Incoming membership state is ignored. The prior state is kept only if
    /// the prior entry had the same center and radius.
    pub fn upsert(&self, mut entry: GeofenceEntry) -> Result<UpsertOutcome, ValidationError> {
        Validator::validate_entry(&entry)?;

        let mut entries = self.lock();
        let outcome = match entries.get(&entry.id) {
            Some(prior) if prior.same_geometry(&entry) => {
                entry.membership_state = prior.membership_state;
                entry.last_transition_at = prior.last_transition_at;
                UpsertOutcome::Preserved
            }
            Some(_) => {
                entry.membership_state = MembershipState::Outside;
                entry.last_transition_at = None;
                UpsertOutcome::Reset
            }
            None => {
                entry.membership_state = MembershipState::Outside;
                entry.last_transition_at = None;
                UpsertOutcome::Inserted
            }
        };

        entries.insert(entry.id.clone(), entry);
        Ok(outcome)
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&self, id: &EntryId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Toggle evaluation eligibility. Returns whether the entry exists.
    pub fn set_active(&self, id: &EntryId, active: bool) -> bool {
        match self.lock().get_mut(id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }

    /// All active entries, ordered by id.
    pub fn snapshot(&self) -> Vec<GeofenceEntry> {
        self.lock()
            .values()
            .filter(|e| e.active)
            .cloned()
            .collect()
    }

    /// Every entry including inactive ones, ordered by id.
    pub fn all(&self) -> Vec<GeofenceEntry> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &EntryId) -> Option<GeofenceEntry> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Apply a reminder store event.
    pub fn sync(&self, event: &ReminderEvent) -> Result<SyncOutcome, ValidationError> {
        match event {
            ReminderEvent::Created(reminder) | ReminderEvent::Updated(reminder) => {
                match reminder.to_entry() {
                    Some(entry) => Ok(SyncOutcome::Upserted(self.upsert(entry)?)),
                    None => Ok(self.remove_outcome(&EntryId::new(reminder.id.as_str()))),
                }
            }
            ReminderEvent::Deleted { id } => Ok(self.remove_outcome(&EntryId::new(id.as_str()))),
        }
    }

    fn remove_outcome(&self, id: &EntryId) -> SyncOutcome {
        if self.remove(id) {
            SyncOutcome::Removed
        } else {
            SyncOutcome::Unchanged
        }
    }

    /// Record the membership changes described by `transitions`.
    ///
    /// Transitions for entries that no longer exist are ignored.
    pub fn apply(&self, transitions: &[TransitionEvent]) {
        let mut entries = self.lock();
        Self::apply_locked(&mut entries, transitions);
    }

    fn apply_locked(entries: &mut BTreeMap<EntryId, GeofenceEntry>, transitions: &[TransitionEvent]) {
        for transition in transitions {
            if let Some(entry) = entries.get_mut(&transition.entry_id) {
                entry.membership_state = match transition.kind {
                    TransitionKind::Entered => MembershipState::Inside,
                    TransitionKind::Exited => MembershipState::Outside,
                };
                entry.last_transition_at = Some(transition.at);
            }
        }
    }

    /// Evaluate `fix` against the active entries and apply the resulting
    /// transitions, all under one lock.
    pub fn evaluate(&self, evaluator: &ProximityEvaluator, fix: &PositionFix) -> Vec<TransitionEvent> {
        let mut entries = self.lock();
        let active: Vec<GeofenceEntry> = entries.values().filter(|e| e.active).cloned().collect();

        let transitions = evaluator.evaluate(fix, &active);
        Self::apply_locked(&mut entries, &transitions);
        transitions
    }
}
