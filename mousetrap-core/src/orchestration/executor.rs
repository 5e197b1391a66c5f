use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mousetrap_contracts::{BackendError, ObjectStorage, ScanEngine};
use mousetrap_model::{ScanResult, Task, Verdict};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::Result;
use crate::orchestration::finalizer::Finalizer;

/// Why a scan did not produce a decisive verdict.
#[derive(Error, Debug)]
pub enum ScanFailure {
    #[error("scan exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("scan engine could not decide")]
    Indeterminate,

    #[error("failed to open file stream: {0}")]
    Stream(BackendError),

    #[error("scan engine error: {0}")]
    Engine(BackendError),
}

#[derive(Debug)]
pub enum ScanOutcome {
    Clean,
    Infected(Vec<String>),
    Failed(ScanFailure),
}

impl ScanOutcome {
    /// Result to persist, `None` for the failure path.
    pub fn scan_result(&self) -> Option<ScanResult> {
        match self {
            ScanOutcome::Clean => Some(ScanResult::Clean),
            ScanOutcome::Infected(_) => Some(ScanResult::Infected),
            ScanOutcome::Failed(_) => None,
        }
    }

    pub fn viruses(&self) -> &[String] {
        match self {
            ScanOutcome::Infected(names) => names,
            _ => &[],
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ScanOutcome::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            ScanOutcome::Clean => "clean",
            ScanOutcome::Infected(_) => "infected",
            ScanOutcome::Failed(ScanFailure::Timeout(_)) => "timeout",
            ScanOutcome::Failed(_) => "failed",
        }
    }
}

impl From<Verdict> for ScanOutcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Clean => ScanOutcome::Clean,
            Verdict::Infected(names) => ScanOutcome::Infected(names),
            Verdict::Indeterminate => {
                ScanOutcome::Failed(ScanFailure::Indeterminate)
            }
        }
    }
}

/// Runs one scan under the deadline and hands the outcome to the
/// [`Finalizer`].
pub struct ScanExecutor {
    storage: Arc<dyn ObjectStorage>,
    engine: Arc<dyn ScanEngine>,
    finalizer: Finalizer,
    scan_timeout: Duration,
}

impl fmt::Debug for ScanExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanExecutor")
            .field("storage", &type_name_of_val(self.storage.as_ref()))
            .field("engine", &type_name_of_val(self.engine.as_ref()))
            .field("finalizer", &self.finalizer)
            .field("scan_timeout", &self.scan_timeout)
            .finish()
    }
}

impl ScanExecutor {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        engine: Arc<dyn ScanEngine>,
        finalizer: Finalizer,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            engine,
            finalizer,
            scan_timeout,
        }
    }

    /// Scan a claimed task without touching the store.
    ///
    /// The deadline covers the engine call only. When it fires the engine
    /// future is dropped and the stream with it.
    pub async fn execute(&self, task: &Task) -> ScanOutcome {
        let started = Instant::now();

        let outcome = match self.storage.open_stream(&task.file_path).await {
            Err(err) => ScanOutcome::Failed(ScanFailure::Stream(err)),
            Ok(stream) => {
                match tokio::time::timeout(
                    self.scan_timeout,
                    self.engine.scan(stream),
                )
                .await
                {
                    Err(_) => ScanOutcome::Failed(ScanFailure::Timeout(
                        self.scan_timeout,
                    )),
                    Ok(Err(err)) => {
                        ScanOutcome::Failed(ScanFailure::Engine(err))
                    }
                    Ok(Ok(verdict)) => ScanOutcome::from(verdict),
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            ScanOutcome::Failed(reason) => warn!(
                target: "mousetrap::scan",
                file = %task.file_path,
                size_mb = task.size_mb,
                duration_ms,
                outcome = outcome.label(),
                reason = %reason,
                "scan failed"
            ),
            _ => info!(
                target: "mousetrap::scan",
                file = %task.file_path,
                size_mb = task.size_mb,
                duration_ms,
                outcome = outcome.label(),
                viruses = ?outcome.viruses(),
                "scan complete"
            ),
        }

        outcome
    }

    /// Scan and finalize. Returns the row as written by the finalizer.
    pub async fn process(&self, task: &Task) -> Result<Task> {
        let outcome = self.execute(task).await;
        self.finalizer.finish(task, &outcome).await
    }
}
