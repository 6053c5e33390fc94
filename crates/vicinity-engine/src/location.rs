use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

use vicinity_core::RawFix;

/// Item delivered by a location subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationUpdate {
    Fix(RawFix),
    /// The user withdrew location permission; no further fixes will arrive.
    PermissionRevoked,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("No active location subscription")]
    NotSubscribed,

    #[error("Location subscription already active")]
    AlreadySubscribed,

    #[error("Location buffer full, update dropped")]
    BufferFull,

    #[error("Location provider unavailable: {0}")]
    Unavailable(String),
}

/// Source of position fixes.
///
/// A provider hands out one subscription at a time. The stream ends when the
/// provider closes its side or after `unsubscribe`.
pub trait LocationProvider: Send + Sync + 'static {
    fn subscribe(&self) -> Result<mpsc::Receiver<LocationUpdate>, LocationError>;

    fn unsubscribe(&self);
}

/// Provider fed by in-process callers, such as the HTTP fix endpoint.
pub struct ChannelLocationProvider {
    sender: Mutex<Option<mpsc::Sender<LocationUpdate>>>,
    capacity: usize,
}

impl ChannelLocationProvider {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: Mutex::new(None),
            capacity: capacity.max(1),
        }
    }

    fn send(&self, update: LocationUpdate) -> Result<(), LocationError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(LocationError::NotSubscribed)?;

        sender.try_send(update).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LocationError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => LocationError::NotSubscribed,
        })
    }

    /// Push a fix to the current subscriber.
    pub fn publish(&self, fix: RawFix) -> Result<(), LocationError> {
        self.send(LocationUpdate::Fix(fix))
    }

    pub fn revoke_permission(&self) -> Result<(), LocationError> {
        self.send(LocationUpdate::PermissionRevoked)
    }

    /// End the current subscription's stream.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_subscribed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }
}

impl Default for ChannelLocationProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

impl LocationProvider for ChannelLocationProvider {
    fn subscribe(&self) -> Result<mpsc::Receiver<LocationUpdate>, LocationError> {
        let mut guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|s| !s.is_closed()) {
            return Err(LocationError::AlreadySubscribed);
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        *guard = Some(tx);
        Ok(rx)
    }

    fn unsubscribe(&self) {
        self.close();
    }
}
