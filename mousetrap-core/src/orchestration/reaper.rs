use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use mousetrap_contracts::{BackendError, TaskStore};
use mousetrap_model::{EpochMillis, Task, TaskTransition};
use tracing::{debug, info, warn};

/// Returns SCANNING tasks abandoned by crashed workers to PENDING.
///
/// Reclaim never touches the attempt counter and has no upper bound;
/// `max_scan_attempts` is only reported.
pub struct StaleTaskReaper {
    store: Arc<dyn TaskStore>,
    stale_after_ms: i64,
    max_scan_attempts: u32,
}

impl fmt::Debug for StaleTaskReaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleTaskReaper")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("stale_after_ms", &self.stale_after_ms)
            .field("max_scan_attempts", &self.max_scan_attempts)
            .finish()
    }
}

impl StaleTaskReaper {
    pub fn new(
        store: Arc<dyn TaskStore>,
        stale_after_ms: i64,
        max_scan_attempts: u32,
    ) -> Self {
        Self {
            store,
            stale_after_ms,
            max_scan_attempts,
        }
    }

    /// Reclaim every stale task in `scanning`. Returns how many rows went
    /// back to PENDING; a failed write is logged and skipped.
    ///
    /// `scanning` is a listing taken earlier in the tick, so the write is
    /// guarded on SCANNING. A row that went terminal since is skipped.
    pub async fn reap(&self, scanning: &[Task], now: EpochMillis) -> usize {
        let mut reclaimed = 0;
        for task in scanning
            .iter()
            .filter(|task| task.is_stale(now, self.stale_after_ms))
        {
            if task.scan_attempts >= self.max_scan_attempts {
                warn!(
                    file = %task.file_path,
                    attempts = task.scan_attempts,
                    max_attempts = self.max_scan_attempts,
                    "stale task exceeded max scan attempts, reclaiming anyway"
                );
            }

            match self
                .store
                .transition(&task.file_path, TaskTransition::requeue())
                .await
            {
                Ok(_) => {
                    reclaimed += 1;
                    info!(
                        step = "reclaim_stale",
                        file = %task.file_path,
                        scan_start_ts = task.scan_start_ts,
                        success = true,
                        "stale task returned to pending"
                    );
                }
                Err(BackendError::RaceLost(_)) => debug!(
                    step = "reclaim_stale",
                    file = %task.file_path,
                    "stale task left scanning before reclaim, skipping"
                ),
                Err(err) => warn!(
                    step = "reclaim_stale",
                    file = %task.file_path,
                    success = false,
                    error = %err,
                    "failed to reclaim stale task"
                ),
            }
        }
        reclaimed
    }
}
