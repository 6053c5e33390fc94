//! Turns ENTERED transitions into notification requests.
//!
//! Two policies sit between the evaluator and the delivery API:
//!
//! - a per-entry dedupe cache suppressing repeat ENTERED events inside the
//!   cooldown window, measured on the events' own timestamps so replayed or
//!   out-of-order fixes are caught as well
//! - a process-wide token bucket capping outward requests per minute;
//!   requests without a token wait in a FIFO queue and are released on
//!   later dispatch calls

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;

use vicinity_core::{EngineConfig, EntryId, TransitionEvent, TransitionKind};

use crate::notifier::NotificationRequest;

/// Why an ENTERED event produced no notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Same entry notified (or waiting in the queue) within the cooldown.
    Duplicate,
    /// Fix accuracy exceeded the radius and the policy drops such events.
    LowConfidence,
    /// Geofence removed or deactivated while its request waited in the queue.
    Withdrawn,
}

/// Outcome of dispatching one event (or releasing one queued request).
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    Dispatched(NotificationRequest),
    Queued(EntryId),
    Suppressed(EntryId, SuppressReason),
    /// EXITED transitions only re-arm the geofence.
    Ignored(EntryId),
}

impl DispatchResult {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchResult::Dispatched(_))
    }
}

/// Token bucket refilled continuously at `capacity` tokens per minute.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn per_minute(limit: u32, now: Instant) -> Self {
        let capacity = f64::from(limit.max(1));
        Self {
            capacity,
            tokens: capacity,
            per_second: capacity / 60.0,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        self.last_refill = now;
    }

    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one whole token is available.
    pub fn time_until_token(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.per_second)
        }
    }
}

/// Short-lived cache of when each entry was last notified.
#[derive(Debug)]
struct DedupeCache {
    cooldown: chrono::Duration,
    last_dispatched: HashMap<EntryId, DateTime<Utc>>,
}

impl DedupeCache {
    fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::weeks(52)),
            last_dispatched: HashMap::new(),
        }
    }

    fn is_duplicate(&self, id: &EntryId, at: DateTime<Utc>) -> bool {
        self.last_dispatched
            .get(id)
            .is_some_and(|last| (at - *last).abs() < self.cooldown)
    }

    fn record(&mut self, id: EntryId, at: DateTime<Utc>) {
        let slot = self.last_dispatched.entry(id).or_insert(at);
        if at > *slot {
            *slot = at;
        }
        self.prune(at);
    }

    /// Forget entries whose cooldown ended before `reference`.
    fn prune(&mut self, reference: DateTime<Utc>) {
        let cooldown = self.cooldown;
        self.last_dispatched
            .retain(|_, last| reference - *last < cooldown);
    }

    fn len(&self) -> usize {
        self.last_dispatched.len()
    }
}

#[derive(Debug)]
struct Pending {
    request: NotificationRequest,
    at: DateTime<Utc>,
}

/// Applies dedupe and rate limiting to transition events.
pub struct NotificationDispatcher {
    dedupe: DedupeCache,
    bucket: TokenBucket,
    pending: VecDeque<Pending>,
    suppress_low_confidence: bool,
    outbox: Option<mpsc::UnboundedSender<NotificationRequest>>,
}

impl NotificationDispatcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_start(config, Instant::now())
    }

    /// Create a dispatcher whose token bucket starts full at `now`.
    pub fn with_start(config: &EngineConfig, now: Instant) -> Self {
        Self {
            dedupe: DedupeCache::new(config.dedupe_cooldown()),
            bucket: TokenBucket::per_minute(config.rate_limit_per_minute, now),
            pending: VecDeque::new(),
            suppress_low_confidence: config.suppress_low_confidence,
            outbox: None,
        }
    }

    /// Forward dispatched requests to a delivery worker.
    pub fn with_outbox(mut self, outbox: mpsc::UnboundedSender<NotificationRequest>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn dispatch(&mut self, events: &[TransitionEvent]) -> Vec<DispatchResult> {
        self.dispatch_at(events, Instant::now())
    }

    /// Release queued requests, then process `events` in order.
    pub fn dispatch_at(&mut self, events: &[TransitionEvent], now: Instant) -> Vec<DispatchResult> {
        let mut results = self.flush_at(now);

        for event in events {
            let result = match event.kind {
                TransitionKind::Exited => DispatchResult::Ignored(event.entry_id.clone()),
                TransitionKind::Entered => self.dispatch_entered(event, now),
            };
            results.push(result);
        }

        results
    }

    fn dispatch_entered(&mut self, event: &TransitionEvent, now: Instant) -> DispatchResult {
        let id = &event.entry_id;

        if self.suppress_low_confidence && event.is_low_confidence() {
            tracing::debug!(entry_id = %id, "Suppressing low-confidence entry");
            return DispatchResult::Suppressed(id.clone(), SuppressReason::LowConfidence);
        }

        if self.dedupe.is_duplicate(id, event.at) || self.is_pending(id) {
            tracing::debug!(entry_id = %id, "Suppressing duplicate entry");
            return DispatchResult::Suppressed(id.clone(), SuppressReason::Duplicate);
        }

        let request = NotificationRequest::for_transition(event);

        if !self.pending.is_empty() || !self.bucket.try_take(now) {
            tracing::debug!(entry_id = %id, "Rate limited, queueing notification");
            self.pending.push_back(Pending {
                request,
                at: event.at,
            });
            return DispatchResult::Queued(id.clone());
        }

        self.send(request, event.at)
    }

    fn send(&mut self, request: NotificationRequest, at: DateTime<Utc>) -> DispatchResult {
        self.dedupe.record(request.entry_id.clone(), at);

        if let Some(outbox) = &self.outbox {
            if outbox.send(request.clone()).is_err() {
                tracing::warn!(
                    entry_id = %request.entry_id,
                    "Delivery worker is gone, notification not delivered"
                );
            }
        }

        DispatchResult::Dispatched(request)
    }

    fn is_pending(&self, id: &EntryId) -> bool {
        self.pending.iter().any(|p| &p.request.entry_id == id)
    }

    pub fn flush(&mut self) -> Vec<DispatchResult> {
        self.flush_at(Instant::now())
    }

    /// Release as many queued requests as the bucket allows.
    pub fn flush_at(&mut self, now: Instant) -> Vec<DispatchResult> {
        let mut results = Vec::new();
        while !self.pending.is_empty() && self.bucket.try_take(now) {
            if let Some(pending) = self.pending.pop_front() {
                results.push(self.send(pending.request, pending.at));
            }
        }
        results
    }

    /// Drop queued requests whose entry no longer passes `keep`.
    pub fn retain_pending(&mut self, keep: impl Fn(&EntryId) -> bool) -> Vec<DispatchResult> {
        let mut results = Vec::new();
        self.pending.retain(|p| {
            let id = &p.request.entry_id;
            if keep(id) {
                return true;
            }
            tracing::debug!(entry_id = %id, "Withdrawing queued notification");
            results.push(DispatchResult::Suppressed(id.clone(), SuppressReason::Withdrawn));
            false
        });
        results
    }

    /// How long until the head of the queue can be sent, if anything waits.
    pub fn next_retry_in(&mut self, now: Instant) -> Option<Duration> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.bucket.time_until_token(now))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn dedupe_len(&self) -> usize {
        self.dedupe.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vicinity_core::Diagnostics;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn event(id: &str, kind: TransitionKind, at: DateTime<Utc>) -> TransitionEvent {
        TransitionEvent {
            entry_id: EntryId::new(id),
            kind,
            at,
            distance_meters: 5.0,
            title: format!("Reminder {}", id),
            category: None,
            radius_meters: 10.0,
            diagnostics: Some(Diagnostics {
                low_confidence: false,
                accuracy_meters: 5.0,
            }),
        }
    }

    fn entered(id: &str, at: DateTime<Utc>) -> TransitionEvent {
        event(id, TransitionKind::Entered, at)
    }

    fn count_dispatched(results: &[DispatchResult]) -> usize {
        results.iter().filter(|r| r.is_dispatched()).count()
    }

    #[test]
    fn test_entered_dispatches() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        let results = dispatcher.dispatch_at(&[entered("r1", t(0))], now);

        assert_eq!(results.len(), 1);
        match &results[0] {
            DispatchResult::Dispatched(request) => {
                assert_eq!(request.entry_id.as_str(), "r1");
                assert_eq!(request.title, "Reminder r1");
            }
            other => panic!("expected dispatch, got {:?}", other),
        }
    }

    #[test]
    fn test_exited_is_ignored() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        let results = dispatcher.dispatch_at(&[event("r1", TransitionKind::Exited, t(0))], now);
        assert_eq!(results, vec![DispatchResult::Ignored(EntryId::new("r1"))]);
    }

    #[test]
    fn test_duplicate_within_cooldown_suppressed() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        let results = dispatcher.dispatch_at(&[entered("r1", t(0)), entered("r1", t(30))], now);

        assert_eq!(count_dispatched(&results), 1);
        assert_eq!(
            results[1],
            DispatchResult::Suppressed(EntryId::new("r1"), SuppressReason::Duplicate)
        );
    }

    #[test]
    fn test_out_of_order_duplicate_suppressed() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        dispatcher.dispatch_at(&[entered("r1", t(100))], now);
        let results = dispatcher.dispatch_at(&[entered("r1", t(50))], now);

        assert_eq!(count_dispatched(&results), 0);
    }

    #[test]
    fn test_entered_after_cooldown_dispatches_again() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        dispatcher.dispatch_at(&[entered("r1", t(0))], now);
        let results = dispatcher.dispatch_at(&[entered("r1", t(60))], now);

        assert_eq!(count_dispatched(&results), 1);
    }

    #[test]
    fn test_dedupe_cache_pruned() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        dispatcher.dispatch_at(&[entered("a", t(0)), entered("b", t(10))], now);
        assert_eq!(dispatcher.dedupe_len(), 2);

        dispatcher.dispatch_at(&[entered("c", t(65))], now);
        // "a" expired (65s), "b" still cooling down (55s)
        assert_eq!(dispatcher.dedupe_len(), 2);
    }

    #[test]
    fn test_rate_limit_queues_overflow() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        let events: Vec<_> = (0..15).map(|i| entered(&format!("r{:02}", i), t(0))).collect();
        let results = dispatcher.dispatch_at(&events, now);

        let queued = results
            .iter()
            .filter(|r| matches!(r, DispatchResult::Queued(_)))
            .count();
        assert_eq!(count_dispatched(&results), 10);
        assert_eq!(queued, 5);
        assert_eq!(dispatcher.pending_len(), 5);
    }

    #[test]
    fn test_queued_released_on_later_tick_in_order() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        let events: Vec<_> = (0..12).map(|i| entered(&format!("r{:02}", i), t(0))).collect();
        dispatcher.dispatch_at(&events, now);
        assert_eq!(dispatcher.pending_len(), 2);

        // Nothing refilled yet
        assert!(dispatcher.dispatch_at(&[], now).is_empty());

        // One token per 6 seconds at 10/min
        let results = dispatcher.dispatch_at(&[], now + Duration::from_secs(7));
        assert_eq!(results.len(), 1);
        match &results[0] {
            DispatchResult::Dispatched(request) => assert_eq!(request.entry_id.as_str(), "r10"),
            other => panic!("expected dispatch, got {:?}", other),
        }

        let results = dispatcher.flush_at(now + Duration::from_secs(13));
        assert_eq!(count_dispatched(&results), 1);
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[test]
    fn test_new_events_wait_behind_queue() {
        let now = Instant::now();
        let mut dispatcher = NotificationDispatcher::with_start(&EngineConfig::default(), now);

        let events: Vec<_> = (0..11).map(|i| entered(&format!("r{:02}", i), t(0))).collect();
        dispatcher.dispatch_at(&events, now);

        let later = now + Duration::from_secs(7);
        let results = dispatcher.dispatch_at(&[entered("z", t(7))], later);

        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0], DispatchResult::Dispatched(r) if r.entry_id.as_str() == "r10"));
        assert_eq!(results[1], DispatchResult::Queued(EntryId::new("z")));
    }

    #[test]
    fn test_duplicate_of_queued_entry_suppressed() {
        let now = Instant::now();
        let config = EngineConfig {
            rate_limit_per_minute: 1,
            ..EngineConfig::default()
        };
        let mut dispatcher = NotificationDispatcher::with_start(&config, now);

        let events = [entered("a", t(0)), entered("b", t(0)), entered("b", t(1))];
        let results = dispatcher.dispatch_at(&events, now);

        assert_eq!(count_dispatched(&results), 1);
        assert_eq!(results[1], DispatchResult::Queued(EntryId::new("b")));
        assert_eq!(
            results[2],
            DispatchResult::Suppressed(EntryId::new("b"), SuppressReason::Duplicate)
        );
    }

    #[test]
    fn test_retain_pending_withdraws_queued() {
        let now = Instant::now();
        let config = EngineConfig {
            rate_limit_per_minute: 1,
            ..EngineConfig::default()
        };
        let mut dispatcher = NotificationDispatcher::with_start(&config, now);

        let events = [entered("a", t(0)), entered("b", t(0)), entered("c", t(0))];
        dispatcher.dispatch_at(&events, now);
        assert_eq!(dispatcher.pending_len(), 2);

        let results = dispatcher.retain_pending(|id| id.as_str() != "b");
        assert_eq!(
            results,
            vec![DispatchResult::Suppressed(EntryId::new("b"), SuppressReason::Withdrawn)]
        );

        let results = dispatcher.flush_at(now + Duration::from_secs(61));
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], DispatchResult::Dispatched(r) if r.entry_id.as_str() == "c"));
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[test]
    fn test_next_retry_in() {
        let now = Instant::now();
        let config = EngineConfig {
            rate_limit_per_minute: 1,
            ..EngineConfig::default()
        };
        let mut dispatcher = NotificationDispatcher::with_start(&config, now);
        assert_eq!(dispatcher.next_retry_in(now), None);

        dispatcher.dispatch_at(&[entered("a", t(0)), entered("b", t(0))], now);
        let wait = dispatcher.next_retry_in(now).unwrap();
        assert!((wait.as_secs_f64() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_low_confidence_policy() {
        let now = Instant::now();
        let mut low = entered("r1", t(0));
        low.diagnostics = Some(Diagnostics {
            low_confidence: true,
            accuracy_meters: 80.0,
        });

        let mut permissive = NotificationDispatcher::with_start(&EngineConfig::default(), now);
        assert_eq!(count_dispatched(&permissive.dispatch_at(&[low.clone()], now)), 1);

        let strict_config = EngineConfig {
            suppress_low_confidence: true,
            ..EngineConfig::default()
        };
        let mut strict = NotificationDispatcher::with_start(&strict_config, now);
        assert_eq!(
            strict.dispatch_at(&[low], now),
            vec![DispatchResult::Suppressed(EntryId::new("r1"), SuppressReason::LowConfidence)]
        );
        // Does not start a cooldown
        assert_eq!(count_dispatched(&strict.dispatch_at(&[entered("r1", t(1))], now)), 1);
    }

    #[test]
    fn test_outbox_receives_dispatched_requests() {
        let now = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher =
            NotificationDispatcher::with_start(&EngineConfig::default(), now).with_outbox(tx);

        dispatcher.dispatch_at(&[entered("r1", t(0)), entered("r2", t(0))], now);

        assert_eq!(rx.try_recv().unwrap().entry_id.as_str(), "r1");
        assert_eq!(rx.try_recv().unwrap().entry_id.as_str(), "r2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_token_bucket_refill_caps_at_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::per_minute(2, now);

        assert!(bucket.try_take(now));
        assert!(bucket.try_take(now));
        assert!(!bucket.try_take(now));

        let much_later = now + Duration::from_secs(3600);
        assert!(bucket.try_take(much_later));
        assert!(bucket.try_take(much_later));
        assert!(!bucket.try_take(much_later));
    }
}
