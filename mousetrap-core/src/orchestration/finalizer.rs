use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use mousetrap_contracts::{ObjectStorage, TaskStore};
use mousetrap_model::{EpochMillis, ScanNotification, ScanResult, Task};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::orchestration::executor::ScanOutcome;
use crate::orchestration::notify::NotifierSet;
use crate::orchestration::now_millis;

/// Writes the terminal state, then tags and notifies.
///
/// Only the store write can fail the call. Tagging and notification run
/// after it has committed and their errors are logged and dropped.
pub struct Finalizer {
    store: Arc<dyn TaskStore>,
    storage: Arc<dyn ObjectStorage>,
    notifiers: NotifierSet,
    record_failed_result: bool,
}

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finalizer")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("storage", &type_name_of_val(self.storage.as_ref()))
            .field("notifiers", &self.notifiers)
            .field("record_failed_result", &self.record_failed_result)
            .finish()
    }
}

impl Finalizer {
    pub fn new(
        store: Arc<dyn TaskStore>,
        storage: Arc<dyn ObjectStorage>,
        notifiers: NotifierSet,
        record_failed_result: bool,
    ) -> Self {
        Self {
            store,
            storage,
            notifiers,
            record_failed_result,
        }
    }

    pub async fn finish(
        &self,
        task: &Task,
        outcome: &ScanOutcome,
    ) -> Result<Task> {
        let now = now_millis();
        let path = task.file_path.as_str();

        let (row, reported) = match outcome.scan_result() {
            Some(result) => {
                let row = self
                    .store
                    .set_terminal(path, result, outcome.viruses(), now)
                    .await
                    .inspect_err(|err| {
                        error!(
                            step = "set_finished",
                            file = %path,
                            success = false,
                            error = %err,
                            "failed to record scan result"
                        )
                    })?;
                info!(
                    step = "set_finished",
                    file = %path,
                    result = %result,
                    attempts = row.scan_attempts,
                    success = true,
                    "scan finished"
                );
                (row, result)
            }
            None => {
                let row = self
                    .store
                    .set_failed(path, now, self.record_failed_result)
                    .await
                    .inspect_err(|err| {
                        error!(
                            step = "set_failed",
                            file = %path,
                            success = false,
                            error = %err,
                            "failed to record scan failure"
                        )
                    })?;
                info!(
                    step = "set_failed",
                    file = %path,
                    attempts = row.scan_attempts,
                    success = true,
                    "scan marked failed"
                );
                (row, ScanResult::Failed)
            }
        };

        self.tag(path, reported, now).await;

        let payload = ScanNotification {
            file_path: path.to_string(),
            scan_result: reported,
            viruses: outcome.viruses().to_vec(),
            timestamp: now,
        };
        self.notifiers
            .notify_all(&task.notify_channels, &payload)
            .await;

        Ok(row)
    }

    async fn tag(&self, path: &str, result: ScanResult, ts: EpochMillis) {
        match self.storage.tag(path, result, ts).await {
            Ok(()) => info!(
                step = "tag",
                file = %path,
                result = %result,
                success = true,
                "tagged file"
            ),
            Err(err) => warn!(
                step = "tag",
                file = %path,
                success = false,
                error = %err,
                "failed to tag file"
            ),
        }
    }
}
