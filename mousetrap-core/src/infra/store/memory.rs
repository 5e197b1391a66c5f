use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mousetrap_contracts::{BackendError, Result, TaskStore};
use mousetrap_model::{
    EpochMillis, NewTask, ScanResult, ScanState, Task, TaskTransition,
};
use tokio::sync::Mutex;

#[derive(Default)]
struct StoreState {
    rows: HashMap<String, Row>,
    next_seq: u64,
}

struct Row {
    seq: u64,
    task: Task,
}

/// Single-process task store. Every operation holds one lock, so guarded
/// transitions are atomic the way a conditional write is.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<StoreState>>,
}

impl fmt::Debug for InMemoryTaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryTaskStore");
        match self.state.try_lock() {
            Ok(state) => {
                debug.field("rows", &state.rows.len());
            }
            Err(_) => {
                debug.field("rows", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, bypassing ingestion. Useful for seeding
    /// SCANNING or terminal rows.
    pub async fn insert(&self, task: Task) {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.rows.insert(task.file_path.clone(), Row { seq, task });
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn update<F>(&self, file_path: &str, apply: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) + Send,
    {
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .get_mut(file_path)
            .ok_or_else(|| BackendError::NotFound(file_path.to_string()))?;
        apply(&mut row.task);
        Ok(row.task.clone())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list_by_states(&self, states: &[ScanState]) -> Result<Vec<Task>> {
        let state = self.state.lock().await;
        let mut rows: Vec<&Row> = state
            .rows
            .values()
            .filter(|row| states.contains(&row.task.scan_state))
            .collect();
        rows.sort_by_key(|row| (row.task.created_ts, row.seq));
        Ok(rows.into_iter().map(|row| row.task.clone()).collect())
    }

    async fn get(&self, file_path: &str) -> Result<Option<Task>> {
        let state = self.state.lock().await;
        Ok(state.rows.get(file_path).map(|row| row.task.clone()))
    }

    async fn create(&self, task: NewTask, created_ts: EpochMillis) -> Result<Task> {
        let task = Task::pending(task, created_ts);
        self.insert(task.clone()).await;
        Ok(task)
    }

    async fn transition(
        &self,
        file_path: &str,
        transition: TaskTransition,
    ) -> Result<Task> {
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .get_mut(file_path)
            .ok_or_else(|| BackendError::NotFound(file_path.to_string()))?;
        if !transition.guard_allows(row.task.scan_state) {
            return Err(BackendError::RaceLost(file_path.to_string()));
        }
        row.task.apply(&transition);
        Ok(row.task.clone())
    }

    async fn set_terminal(
        &self,
        file_path: &str,
        result: ScanResult,
        viruses: &[String],
        ts: EpochMillis,
    ) -> Result<Task> {
        let viruses = viruses.to_vec();
        self.update(file_path, move |task| {
            task.scan_state = ScanState::Finished;
            task.scan_result = result;
            task.viruses = viruses;
            task.scan_end_ts = ts;
            task.scan_attempts = task.scan_attempts.saturating_add(1);
        })
        .await
    }

    async fn set_failed(
        &self,
        file_path: &str,
        ts: EpochMillis,
        record_result: bool,
    ) -> Result<Task> {
        self.update(file_path, move |task| {
            task.scan_state = ScanState::Failed;
            task.scan_end_ts = ts;
            task.scan_attempts = task.scan_attempts.saturating_add(1);
            if record_result {
                task.scan_result = ScanResult::Failed;
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(path: &str, size_mb: f64) -> NewTask {
        NewTask {
            file_path: path.into(),
            size_mb,
            file_hash: "etag".into(),
            notify_channels: vec![],
        }
    }

    #[tokio::test]
    async fn create_overwrites_existing_path() {
        let store = InMemoryTaskStore::new();
        store.create(new_task("s3://b/a.csv", 1.0), 10).await.unwrap();
        store
            .transition("s3://b/a.csv", TaskTransition::claim(11))
            .await
            .unwrap();
        store.create(new_task("s3://b/a.csv", 2.0), 20).await.unwrap();

        assert_eq!(store.len().await, 1);
        let row = store.get("s3://b/a.csv").await.unwrap().unwrap();
        assert_eq!(row.size_mb, 2.0);
        assert_eq!(row.scan_state, ScanState::Pending);
        assert_eq!(row.created_ts, 20);
    }

    #[tokio::test]
    async fn listing_orders_by_creation_then_insertion() {
        let store = InMemoryTaskStore::new();
        store.create(new_task("c", 1.0), 30).await.unwrap();
        store.create(new_task("a", 1.0), 10).await.unwrap();
        store.create(new_task("b", 1.0), 10).await.unwrap();

        let paths: Vec<String> = store
            .list_by_states(&[ScanState::Pending])
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.file_path)
            .collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn guarded_transition_reports_race_and_missing_rows() {
        let store = InMemoryTaskStore::new();
        store.create(new_task("a", 1.0), 1).await.unwrap();
        store.transition("a", TaskTransition::claim(2)).await.unwrap();

        let err = store
            .transition("a", TaskTransition::claim(3))
            .await
            .unwrap_err();
        assert!(err.is_race_lost());

        let err = store
            .transition("missing", TaskTransition::claim(3))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn failure_path_keeps_result_unless_asked() {
        let store = InMemoryTaskStore::new();
        store.create(new_task("a", 1.0), 1).await.unwrap();
        let row = store.set_failed("a", 5, false).await.unwrap();
        assert_eq!(row.scan_state, ScanState::Failed);
        assert_eq!(row.scan_result, ScanResult::Pending);
        assert_eq!(row.scan_attempts, 1);
        assert_eq!(row.scan_end_ts, 5);

        let row = store.set_failed("a", 6, true).await.unwrap();
        assert_eq!(row.scan_result, ScanResult::Failed);
        assert_eq!(row.scan_attempts, 2);
    }
}
