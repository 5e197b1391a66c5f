use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mousetrap_contracts::{
    BackendError, ObjectStorage, ScanEngine, TaskStore,
};
use mousetrap_model::{ScanState, Task, TaskTransition};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::Result;
use crate::orchestration::{
    claimer::{ClaimOutcome, TaskClaimer},
    config::OrchestratorConfig,
    executor::ScanExecutor,
    finalizer::Finalizer,
    notify::NotifierSet,
    now_millis,
    reaper::StaleTaskReaper,
    slot::{ScanSlot, SlotGuard},
};

/// What one tick observed and did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub pending: usize,
    pub scanning: usize,
    pub reclaimed: usize,
    /// `None` when a scan was already in flight and the claimer was skipped.
    pub claim: Option<ClaimOutcome>,
}

/// Point-in-time view for the status API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSnapshot {
    pub current_task: Option<Task>,
    pub scanning: Vec<Task>,
    pub pending: Vec<Task>,
}

/// The poll scheduler: reap, claim, and run at most one scan at a time.
pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn TaskStore>,
    slot: ScanSlot,
    claimer: TaskClaimer,
    reaper: StaleTaskReaper,
    executor: Arc<ScanExecutor>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let has_handle = self
            .in_flight
            .try_lock()
            .map(|guard| guard.is_some())
            .unwrap_or(true);

        f.debug_struct("TaskOrchestrator")
            .field("config", &self.config)
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("slot", &self.slot)
            .field("claimer", &self.claimer)
            .field("reaper", &self.reaper)
            .field("executor", &self.executor)
            .field("has_in_flight_handle", &has_handle)
            .finish()
    }
}

impl TaskOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn TaskStore>,
        storage: Arc<dyn ObjectStorage>,
        engine: Arc<dyn ScanEngine>,
        notifiers: NotifierSet,
    ) -> Self {
        let claimer = TaskClaimer::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            notifiers.clone(),
        );
        let reaper = StaleTaskReaper::new(
            Arc::clone(&store),
            config.stale_after_ms_i64(),
            config.max_scan_attempts,
        );
        let finalizer = Finalizer::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            notifiers,
            config.record_failed_result,
        );
        let executor = Arc::new(ScanExecutor::new(
            storage,
            engine,
            finalizer,
            config.scan_timeout(),
        ));

        Self {
            config,
            store,
            slot: ScanSlot::new(),
            claimer,
            reaper,
            executor,
            in_flight: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn slot(&self) -> &ScanSlot {
        &self.slot
    }

    pub fn current_task(&self) -> Option<Task> {
        self.slot.current()
    }

    /// Wait before the next tick: the base interval while Idle, the
    /// backed-off interval while Busy.
    pub fn next_interval(&self) -> Duration {
        if self.slot.is_busy() {
            self.config.busy_interval()
        } else {
            self.config.poll_interval()
        }
    }

    pub async fn snapshot(&self) -> Result<OrchestratorSnapshot> {
        let tasks = self
            .store
            .list_by_states(&[ScanState::Pending, ScanState::Scanning])
            .await?;
        let (pending, scanning) = tasks
            .into_iter()
            .partition(|task| task.scan_state == ScanState::Pending);
        Ok(OrchestratorSnapshot {
            current_task: self.slot.current(),
            scanning,
            pending,
        })
    }

    /// One scheduler tick.
    ///
    /// Lists PENDING and SCANNING once, reaps the stale SCANNING rows, and,
    /// if the slot is free, claims the oldest PENDING task and starts its
    /// scan in the background.
    pub async fn tick(&self) -> Result<TickReport> {
        let tasks = self
            .store
            .list_by_states(&[ScanState::Pending, ScanState::Scanning])
            .await?;
        let (pending, scanning): (Vec<Task>, Vec<Task>) = tasks
            .into_iter()
            .partition(|task| task.scan_state == ScanState::Pending);

        let reclaimed = self.reaper.reap(&scanning, now_millis()).await;

        // The slot flips to Busy here, before the claimer suspends.
        let claim = match self.slot.try_acquire() {
            None => {
                trace!("scan in flight, skipping claim");
                None
            }
            Some(guard) => {
                let outcome = self.claimer.claim_next(&pending).await?;
                if let ClaimOutcome::Claimed(task) = &outcome {
                    self.start(guard, task.clone()).await;
                }
                Some(outcome)
            }
        };

        Ok(TickReport {
            pending: pending.len(),
            scanning: scanning.len(),
            reclaimed,
            claim,
        })
    }

    async fn start(&self, guard: SlotGuard, task: Task) {
        guard.publish(&task);
        let executor = Arc::clone(&self.executor);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = executor.process(&task).await {
                error!(
                    file = %task.file_path,
                    error = %err,
                    "scan could not be finalized"
                );
            }
        });
        *self.in_flight.lock().await = Some(handle);
    }

    /// Wait for the in-flight scan, if any, to finish.
    pub async fn wait_idle(&self) {
        let handle = self.in_flight.lock().await.take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            warn!("scan task ended abnormally: {err}");
        }
    }

    /// Tick until `shutdown` fires or a fatal error occurs, then run
    /// [`TaskOrchestrator::shutdown`].
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            busy_backoff_factor = self.config.busy_backoff_factor,
            stale_after_ms = self.config.stale_after_ms,
            scan_timeout_ms = self.config.scan_timeout_ms,
            "task orchestrator started"
        );

        let outcome = loop {
            if shutdown.is_cancelled() {
                break Ok(());
            }

            match self.tick().await {
                Ok(report) => trace!(?report, "tick complete"),
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "fatal error, stopping orchestrator");
                    break Err(err);
                }
                Err(err) => warn!(error = %err, "tick failed"),
            }

            let wait = self.next_interval();
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                _ = tokio::time::sleep(wait) => {}
            }
        };

        self.shutdown().await;
        outcome
    }

    /// Stop the in-flight scan and put its task back to PENDING with the
    /// attempt counter unchanged. Does not wait for the scan.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of task orchestrator");

        let current = self.slot.current();
        if let Some(handle) = self.in_flight.lock().await.take() {
            handle.abort();
        }

        if let Some(task) = current {
            match self
                .store
                .transition(&task.file_path, TaskTransition::release())
                .await
            {
                Ok(_) => info!(
                    step = "revert_current",
                    file = %task.file_path,
                    success = true,
                    "in-flight task returned to pending"
                ),
                Err(BackendError::RaceLost(_)) => debug!(
                    step = "revert_current",
                    file = %task.file_path,
                    "in-flight task finished before shutdown"
                ),
                Err(err) => error!(
                    step = "revert_current",
                    file = %task.file_path,
                    success = false,
                    error = %err,
                    "failed to return in-flight task to pending"
                ),
            }
        }

        info!("Task orchestrator shutdown complete");
    }
}
