use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use mousetrap_contracts::{BackendError, ObjectStorage, TaskStore};
use mousetrap_model::{ErrorCode, ErrorNotification, Task, TaskTransition};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::orchestration::notify::NotifierSet;
use crate::orchestration::now_millis;

/// Result of one claim attempt. Only `Claimed` hands work to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(Task),
    NothingPending,
    /// The oldest pending file vanished from storage. The row is untouched
    /// and an error notification was sent.
    FileMissing(String),
    /// Another worker claimed the task first.
    RaceLost(String),
}

impl ClaimOutcome {
    pub fn claimed(&self) -> Option<&Task> {
        match self {
            ClaimOutcome::Claimed(task) => Some(task),
            _ => None,
        }
    }
}

/// Picks the oldest PENDING task and tries to take it with a guarded write.
pub struct TaskClaimer {
    store: Arc<dyn TaskStore>,
    storage: Arc<dyn ObjectStorage>,
    notifiers: NotifierSet,
}

impl fmt::Debug for TaskClaimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskClaimer")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("storage", &type_name_of_val(self.storage.as_ref()))
            .field("notifiers", &self.notifiers)
            .finish()
    }
}

impl TaskClaimer {
    pub fn new(
        store: Arc<dyn TaskStore>,
        storage: Arc<dyn ObjectStorage>,
        notifiers: NotifierSet,
    ) -> Self {
        Self {
            store,
            storage,
            notifiers,
        }
    }

    /// Claim the oldest of `pending`. Earliest `created_ts` wins and ties
    /// keep snapshot order.
    pub async fn claim_next(&self, pending: &[Task]) -> Result<ClaimOutcome> {
        let Some(candidate) = pending.iter().min_by_key(|task| task.created_ts)
        else {
            return Ok(ClaimOutcome::NothingPending);
        };
        let path = candidate.file_path.as_str();

        if self.storage.metadata(path).await?.is_none() {
            warn!(
                step = "claim",
                file = %path,
                success = false,
                "pending file no longer exists in storage"
            );
            let payload = ErrorNotification::new(
                path,
                ErrorCode::FileNotExist,
                now_millis(),
            );
            self.notifiers
                .notify_error_all(&candidate.notify_channels, &payload)
                .await;
            return Ok(ClaimOutcome::FileMissing(path.to_string()));
        }

        match self
            .store
            .transition(path, TaskTransition::claim(now_millis()))
            .await
        {
            Ok(task) => {
                info!(
                    step = "set_scanning",
                    file = %task.file_path,
                    attempts = task.scan_attempts,
                    success = true,
                    "claimed task"
                );
                Ok(ClaimOutcome::Claimed(task))
            }
            Err(BackendError::RaceLost(_)) => {
                debug!(
                    step = "set_scanning",
                    file = %path,
                    success = false,
                    "task already being scanned by another worker"
                );
                Ok(ClaimOutcome::RaceLost(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
