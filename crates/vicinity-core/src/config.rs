use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for evaluation, dispatch and tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extra distance beyond the radius required before an `Inside` entry exits.
    pub exit_margin_meters: f64,
    pub dedupe_cooldown_secs: u64,
    /// Outward notification requests allowed per minute, process-wide.
    pub rate_limit_per_minute: u32,
    pub min_fix_interval_secs: u64,
    pub min_displacement_meters: f64,
    pub watchdog_timeout_secs: u64,
    /// Drop ENTERED events whose fix accuracy exceeded the radius.
    pub suppress_low_confidence: bool,
    pub delivery_max_attempts: u32,
    pub delivery_backoff_base_ms: u64,
    pub delivery_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exit_margin_meters: 5.0,
            dedupe_cooldown_secs: 60,
            rate_limit_per_minute: 10,
            min_fix_interval_secs: 15,
            min_displacement_meters: 10.0,
            watchdog_timeout_secs: 30,
            suppress_low_confidence: false,
            delivery_max_attempts: 3,
            delivery_backoff_base_ms: 1_000,
            delivery_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn dedupe_cooldown(&self) -> Duration {
        Duration::from_secs(self.dedupe_cooldown_secs)
    }

    pub fn min_fix_interval(&self) -> Duration {
        Duration::from_secs(self.min_fix_interval_secs)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn delivery_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.delivery_backoff_base_ms.saturating_mul(factor))
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}
