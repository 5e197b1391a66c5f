use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Knobs that tune the poll scheduler, the reaper, and the queue listener.
///
/// All fields carry defaults so a deployment only has to name what it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Tick interval while no scan is in flight (ms).
    pub poll_interval_ms: u64,
    /// Multiplier applied to the tick interval while a scan is in flight.
    pub busy_backoff_factor: u32,
    /// A SCANNING task older than this is presumed abandoned (ms).
    pub stale_after_ms: u64,
    /// Wall-clock deadline for one scan-engine call (ms).
    pub scan_timeout_ms: u64,
    /// Reported when a reclaimed task reaches it; never enforced.
    pub max_scan_attempts: u32,
    /// Write `scanResult = FAILED` on the failure path instead of leaving
    /// the previous verdict in place.
    pub record_failed_result: bool,
    /// Pause after a failed queue receive (ms).
    pub queue_error_backoff_ms: u64,
    /// Pause after an empty queue receive (ms).
    pub queue_poll_interval_ms: u64,
    /// Messages requested per queue receive.
    pub queue_batch_size: usize,
    /// How often the listener sweeps messages held by stopped consumers
    /// back onto the queue (ms).
    pub queue_recovery_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            busy_backoff_factor: 5,
            stale_after_ms: 3_600_000,
            scan_timeout_ms: 1_800_000,
            max_scan_attempts: 5,
            record_failed_result: false,
            queue_error_backoff_ms: 10_000,
            queue_poll_interval_ms: 1_000,
            queue_batch_size: 10,
            queue_recovery_interval_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn busy_interval(&self) -> Duration {
        self.poll_interval()
            .saturating_mul(self.busy_backoff_factor.max(1))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn stale_after_ms_i64(&self) -> i64 {
        i64::try_from(self.stale_after_ms).unwrap_or(i64::MAX)
    }

    pub fn queue_error_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_error_backoff_ms)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn queue_recovery_interval(&self) -> Duration {
        Duration::from_millis(self.queue_recovery_interval_ms)
    }
}
