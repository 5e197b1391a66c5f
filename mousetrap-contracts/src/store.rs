use async_trait::async_trait;
use mousetrap_model::{
    EpochMillis, NewTask, ScanResult, ScanState, Task, TaskTransition,
};

use crate::error::Result;

/// Durable task table keyed by file path.
///
/// Every mutation is a single-row write. [`TaskStore::transition`] is the
/// only synchronisation primitive the orchestrator relies on across
/// processes: a guarded transition must be applied atomically or rejected
/// with [`BackendError::RaceLost`](crate::BackendError::RaceLost).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks in any of `states`, oldest `created_ts` first.
    async fn list_by_states(&self, states: &[ScanState]) -> Result<Vec<Task>>;

    async fn get(&self, file_path: &str) -> Result<Option<Task>>;

    /// Insert a PENDING row, overwriting any existing row for the same path.
    async fn create(&self, task: NewTask, created_ts: EpochMillis) -> Result<Task>;

    /// Apply `transition` and return the updated row.
    ///
    /// Returns `RaceLost` when the guard does not match the stored state and
    /// `NotFound` when no row exists.
    async fn transition(
        &self,
        file_path: &str,
        transition: TaskTransition,
    ) -> Result<Task>;

    /// Record a decisive verdict: FINISHED, result, viruses, end timestamp,
    /// and one more attempt.
    async fn set_terminal(
        &self,
        file_path: &str,
        result: ScanResult,
        viruses: &[String],
        ts: EpochMillis,
    ) -> Result<Task>;

    /// Mark the task FAILED and count the attempt. The stored result is left
    /// alone unless `record_result` is set, in which case it becomes FAILED.
    async fn set_failed(
        &self,
        file_path: &str,
        ts: EpochMillis,
        record_result: bool,
    ) -> Result<Task>;
}
