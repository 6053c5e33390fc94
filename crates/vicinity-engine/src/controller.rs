//! Tracking lifecycle and the fix pipeline.
//!
//! While tracking, one pipeline task owns the location subscription, the fix
//! filter and the dispatcher. Each accepted fix is evaluated against the
//! registry and its ENTERED transitions dispatched before the next fix is
//! read. Delivery runs on a separate worker task fed through the
//! dispatcher's outbox.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};

use vicinity_core::{EngineConfig, GeofenceRegistry, PositionFix, ProximityEvaluator, RawFix};

use crate::delivery::{DeliveryReport, DeliveryWorker};
use crate::dispatcher::{DispatchResult, NotificationDispatcher};
use crate::filter::{FixDecision, FixFilter};
use crate::location::{LocationError, LocationProvider, LocationUpdate};
use crate::notifier::Notifier;

const REPORT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingState {
    Stopped,
    Starting,
    Running,
    /// Running, but no fix arrived within the watchdog timeout.
    Degraded,
    Stopping,
}

/// Why tracking last stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    StreamEnded,
    PermissionRevoked,
    SubscribeFailed,
}

/// Counters for one tracking session. Reset on every `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub fixes_received: u64,
    pub fixes_malformed: u64,
    pub fixes_filtered: u64,
    pub fixes_stale: u64,
    pub fixes_evaluated: u64,
    pub transitions: u64,
    pub notifications_dispatched: u64,
    pub notifications_suppressed: u64,
    pub notifications_queued: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingStatus {
    pub state: TrackingState,
    pub reason: Option<StopReason>,
    pub last_fix_at: Option<DateTime<Utc>>,
    pub stats: PipelineStats,
}

impl Default for TrackingStatus {
    fn default() -> Self {
        Self {
            state: TrackingState::Stopped,
            reason: None,
            last_fix_at: None,
            stats: PipelineStats::default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Tracking already started")]
    AlreadyStarted,

    #[error("Location error: {0}")]
    Location(#[from] LocationError),
}

struct RunningPipeline {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Starts and stops location tracking and exposes its status.
pub struct TrackingController<L: LocationProvider, N: Notifier> {
    registry: Arc<GeofenceRegistry>,
    provider: Arc<L>,
    notifier: Arc<N>,
    config: EngineConfig,
    status: Arc<watch::Sender<TrackingStatus>>,
    reports: broadcast::Sender<DeliveryReport>,
    pipeline: Mutex<Option<RunningPipeline>>,
}

impl<L: LocationProvider, N: Notifier> TrackingController<L, N> {
    pub fn new(
        registry: Arc<GeofenceRegistry>,
        provider: Arc<L>,
        notifier: Arc<N>,
        config: EngineConfig,
    ) -> Self {
        let (status, _) = watch::channel(TrackingStatus::default());
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            registry,
            provider,
            notifier,
            config,
            status: Arc::new(status),
            reports,
            pipeline: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<GeofenceRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<L> {
        &self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> watch::Receiver<TrackingStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> TrackingStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> TrackingState {
        self.status.borrow().state
    }

    /// Delivery reports for requests dispatched after this call.
    pub fn reports(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    /// Subscribe to the location provider and start the pipeline.
    pub async fn start(&self) -> Result<(), TrackingError> {
        let mut pipeline = self.pipeline.lock().await;

        if self.state() != TrackingState::Stopped {
            return Err(TrackingError::AlreadyStarted);
        }

        // A pipeline that ended on its own is already past cleanup
        if let Some(previous) = pipeline.take() {
            let _ = previous.handle.await;
        }

        self.status.send_replace(TrackingStatus {
            state: TrackingState::Starting,
            ..TrackingStatus::default()
        });

        let updates = match self.provider.subscribe() {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("Location subscription failed: {}", e);
                self.status.send_modify(|s| {
                    s.state = TrackingState::Stopped;
                    s.reason = Some(StopReason::SubscribeFailed);
                });
                return Err(e.into());
            }
        };

        let (outbox, requests) = mpsc::unbounded_channel();
        let worker = DeliveryWorker::new(
            self.notifier.clone(),
            &self.config,
            requests,
            self.reports.clone(),
        );
        let report_rx = self.reports.subscribe();
        let worker = tokio::spawn(worker.run());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = Pipeline {
            registry: self.registry.clone(),
            provider: self.provider.clone(),
            evaluator: ProximityEvaluator::new(self.config.exit_margin_meters),
            filter: FixFilter::new(&self.config),
            dispatcher: NotificationDispatcher::new(&self.config).with_outbox(outbox),
            status: self.status.clone(),
            watchdog_timeout: self.config.watchdog_timeout(),
            last_fix: Instant::now(),
        };
        let handle = tokio::spawn(task.run(updates, report_rx, shutdown_rx, worker));

        *pipeline = Some(RunningPipeline { shutdown, handle });
        tracing::info!("Tracking started");
        Ok(())
    }

    /// Stop tracking. Returns once the pipeline and delivery worker are gone.
    pub async fn stop(&self) {
        let mut pipeline = self.pipeline.lock().await;
        let Some(running) = pipeline.take() else {
            return;
        };

        if self.state() != TrackingState::Stopped {
            self.status.send_modify(|s| s.state = TrackingState::Stopping);
        }

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!("Tracking pipeline failed: {}", e);
            self.provider.unsubscribe();
            self.status.send_modify(|s| {
                s.state = TrackingState::Stopped;
                s.reason = Some(StopReason::Requested);
            });
        }
    }
}

struct Pipeline<L: LocationProvider> {
    registry: Arc<GeofenceRegistry>,
    provider: Arc<L>,
    evaluator: ProximityEvaluator,
    filter: FixFilter,
    dispatcher: NotificationDispatcher,
    status: Arc<watch::Sender<TrackingStatus>>,
    watchdog_timeout: Duration,
    last_fix: Instant,
}

impl<L: LocationProvider> Pipeline<L> {
    async fn run(
        mut self,
        mut updates: mpsc::Receiver<LocationUpdate>,
        mut reports: broadcast::Receiver<DeliveryReport>,
        mut shutdown: watch::Receiver<bool>,
        worker: JoinHandle<()>,
    ) {
        let reason = loop {
            // No deadline when the timeout is too large to represent
            let watchdog_deadline = self.last_fix.checked_add(self.watchdog_timeout);
            let watchdog_armed = watchdog_deadline.is_some()
                && self.status.borrow().state == TrackingState::Running;
            let retry_in = self.dispatcher.next_retry_in(Instant::now());

            tokio::select! {
                biased;

                _ = shutdown.changed() => break StopReason::Requested,

                update = updates.recv() => match update {
                    Some(LocationUpdate::Fix(raw)) => self.handle_fix(raw),
                    Some(LocationUpdate::PermissionRevoked) => {
                        tracing::warn!("Location permission revoked");
                        break StopReason::PermissionRevoked;
                    }
                    None => {
                        tracing::warn!("Location stream ended");
                        break StopReason::StreamEnded;
                    }
                },

                report = reports.recv() => match report {
                    Ok(report) => self.record_report(&report),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Missed {} delivery reports", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },

                _ = sleep_until(watchdog_deadline.unwrap_or(self.last_fix)), if watchdog_armed => {
                    tracing::warn!(
                        "No location fix for {:?}, tracking degraded",
                        self.watchdog_timeout
                    );
                    self.status.send_modify(|s| s.state = TrackingState::Degraded);
                }

                _ = sleep(retry_in.unwrap_or_default()), if retry_in.is_some() => {
                    self.withdraw_pending();
                    let results = self.dispatcher.flush();
                    self.record_dispatch(&results);
                }
            }
        };

        // Drop buffered fixes before the provider sees the unsubscribe
        drop(updates);
        self.provider.unsubscribe();

        worker.abort();
        let _ = worker.await;

        self.status.send_modify(|s| {
            s.state = TrackingState::Stopped;
            s.reason = Some(reason);
        });
        tracing::info!(reason = ?reason, "Tracking stopped");
    }

    fn handle_fix(&mut self, raw: RawFix) {
        self.status.send_modify(|s| s.stats.fixes_received += 1);

        let fix = match PositionFix::try_from(raw) {
            Ok(fix) => fix,
            Err(e) => {
                tracing::warn!("Dropping malformed fix: {}", e);
                self.status.send_modify(|s| s.stats.fixes_malformed += 1);
                return;
            }
        };

        self.last_fix = Instant::now();
        self.status.send_modify(|s| {
            if matches!(s.state, TrackingState::Starting | TrackingState::Degraded) {
                s.state = TrackingState::Running;
            }
        });

        match self.filter.check(&fix) {
            FixDecision::Accept => {}
            FixDecision::TooSoon => {
                tracing::debug!("Fix throttled");
                self.status.send_modify(|s| s.stats.fixes_filtered += 1);
                return;
            }
            FixDecision::Stale => {
                tracing::debug!(timestamp = %fix.timestamp, "Dropping stale fix");
                self.status.send_modify(|s| s.stats.fixes_stale += 1);
                return;
            }
        }

        let transitions = self.registry.evaluate(&self.evaluator, &fix);
        tracing::debug!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            transitions = transitions.len(),
            "Evaluated fix"
        );
        self.status.send_modify(|s| {
            s.stats.fixes_evaluated += 1;
            s.stats.transitions += transitions.len() as u64;
            s.last_fix_at = self.filter.last_accepted_at();
        });

        self.withdraw_pending();
        let results = self.dispatcher.dispatch(&transitions);
        self.record_dispatch(&results);
    }

    /// Drop queued requests for geofences removed or deactivated since they were queued.
    fn withdraw_pending(&mut self) {
        if self.dispatcher.pending_len() == 0 {
            return;
        }
        let active: HashSet<_> = self.registry.snapshot().into_iter().map(|e| e.id).collect();
        let results = self.dispatcher.retain_pending(|id| active.contains(id));
        self.record_dispatch(&results);
    }

    fn record_dispatch(&self, results: &[DispatchResult]) {
        if results.is_empty() {
            return;
        }
        self.status.send_modify(|s| {
            for result in results {
                match result {
                    DispatchResult::Dispatched(_) => s.stats.notifications_dispatched += 1,
                    DispatchResult::Queued(_) => s.stats.notifications_queued += 1,
                    DispatchResult::Suppressed(..) => s.stats.notifications_suppressed += 1,
                    DispatchResult::Ignored(_) => {}
                }
            }
        });
    }

    fn record_report(&self, report: &DeliveryReport) {
        self.status.send_modify(|s| {
            if report.is_delivered() {
                s.stats.deliveries_succeeded += 1;
            } else {
                s.stats.deliveries_failed += 1;
            }
        });
    }
}
