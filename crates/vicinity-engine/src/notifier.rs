use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use vicinity_core::{EntryId, TransitionEvent};

/// A notification ready to be handed to the delivery API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Stable across retries so the receiver can drop duplicates.
    pub request_id: Uuid,
    pub entry_id: EntryId,
    pub title: String,
    pub body: String,
}

impl NotificationRequest {
    /// Build the notification for an ENTERED transition.
    pub fn for_transition(event: &TransitionEvent) -> Self {
        let body = match &event.category {
            Some(category) => format!("{}: within {:.0} m", category, event.radius_meters),
            None => format!("You are within {:.0} m of this reminder", event.radius_meters),
        };

        Self {
            request_id: Uuid::new_v4(),
            entry_id: event.entry_id.clone(),
            title: event.title.clone(),
            body,
        }
    }
}

/// Error type for notification delivery. All variants are treated as
/// transient.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Delivery rejected with status {0}")]
    Rejected(u16),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Trait for the external notification-delivery API.
pub trait Notifier: Send + Sync + 'static {
    fn deliver(
        &self,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Notifier that only writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        tracing::info!(
            entry_id = %request.entry_id,
            request_id = %request.request_id,
            "Notification: {} - {}",
            request.title,
            request.body
        );
        Ok(())
    }
}

/// Notifier that POSTs each request as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}

// In-memory notifier for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every delivery attempt and fails according to a script.
    #[derive(Default)]
    pub struct RecordingNotifier {
        attempts: Mutex<Vec<NotificationRequest>>,
        delivered: Mutex<Vec<NotificationRequest>>,
        failures: Mutex<VecDeque<DeliveryError>>,
        always_fail: Mutex<bool>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `n` attempts with a transport error.
        pub fn fail_next(&self, n: usize) {
            let mut failures = self.failures.lock().unwrap();
            for _ in 0..n {
                failures.push_back(DeliveryError::Transport("connection refused".to_string()));
            }
        }

        pub fn fail_always(&self) {
            *self.always_fail.lock().unwrap() = true;
        }

        pub fn attempts(&self) -> Vec<NotificationRequest> {
            self.attempts.lock().unwrap().clone()
        }

        pub fn delivered(&self) -> Vec<NotificationRequest> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
            self.attempts.lock().unwrap().push(request.clone());

            if *self.always_fail.lock().unwrap() {
                return Err(DeliveryError::Rejected(503));
            }
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }

            self.delivered.lock().unwrap().push(request.clone());
            Ok(())
        }
    }
}
