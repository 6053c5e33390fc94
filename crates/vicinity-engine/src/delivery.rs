use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use vicinity_core::{EngineConfig, EntryId};

use crate::notifier::{DeliveryError, NotificationRequest, Notifier};

/// Final result of delivering one notification request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { error: String },
}

/// Reported once per request after its last attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub request_id: Uuid,
    pub entry_id: EntryId,
    pub attempts: u32,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.outcome == DeliveryOutcome::Delivered
    }
}

#[derive(Debug)]
struct DeliveryJob {
    request: NotificationRequest,
    attempt: u32,
}

/// Delivers notification requests, retrying failures with exponential
/// backoff.
///
/// Retries are scheduled as timers in a `JoinSet` owned by the worker, so
/// the worker keeps serving new requests while others wait, and aborting
/// the worker task cancels every pending retry with it.
pub struct DeliveryWorker<N: Notifier> {
    notifier: Arc<N>,
    requests: mpsc::UnboundedReceiver<NotificationRequest>,
    reports: broadcast::Sender<DeliveryReport>,
    config: EngineConfig,
}

impl<N: Notifier> DeliveryWorker<N> {
    pub fn new(
        notifier: Arc<N>,
        config: &EngineConfig,
        requests: mpsc::UnboundedReceiver<NotificationRequest>,
        reports: broadcast::Sender<DeliveryReport>,
    ) -> Self {
        Self {
            notifier,
            requests,
            reports,
            config: config.clone(),
        }
    }

    /// Run until the request channel is closed and no retries are pending.
    pub async fn run(mut self) {
        let mut retries: JoinSet<DeliveryJob> = JoinSet::new();

        loop {
            let job = tokio::select! {
                Some(request) = self.requests.recv() => DeliveryJob { request, attempt: 1 },
                Some(joined) = retries.join_next(), if !retries.is_empty() => match joined {
                    Ok(job) => job,
                    Err(e) => {
                        tracing::warn!("Retry timer failed: {}", e);
                        continue;
                    }
                },
                else => break,
            };

            self.attempt(job, &mut retries).await;
        }

        tracing::debug!("Delivery worker finished");
    }

    async fn attempt(&self, job: DeliveryJob, retries: &mut JoinSet<DeliveryJob>) {
        let limit = self.config.delivery_timeout();
        let result = match timeout(limit, self.notifier.deliver(&job.request)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(limit)),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    entry_id = %job.request.entry_id,
                    attempt = job.attempt,
                    "Notification delivered"
                );
                self.report(&job, DeliveryOutcome::Delivered);
            }
            Err(e) if job.attempt < self.config.delivery_max_attempts => {
                let delay = self.config.delivery_backoff(job.attempt);
                tracing::warn!(
                    entry_id = %job.request.entry_id,
                    attempt = job.attempt,
                    "Delivery failed, retrying in {:?}: {}",
                    delay,
                    e
                );
                let next = DeliveryJob {
                    request: job.request,
                    attempt: job.attempt + 1,
                };
                retries.spawn(async move {
                    sleep(delay).await;
                    next
                });
            }
            Err(e) => {
                tracing::error!(
                    entry_id = %job.request.entry_id,
                    attempts = job.attempt,
                    "Delivery failed permanently: {}",
                    e
                );
                self.report(
                    &job,
                    DeliveryOutcome::Failed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    fn report(&self, job: &DeliveryJob, outcome: DeliveryOutcome) {
        // No subscribers is fine
        let _ = self.reports.send(DeliveryReport {
            request_id: job.request.request_id,
            entry_id: job.request.entry_id.clone(),
            attempts: job.attempt,
            outcome,
        });
    }
}
