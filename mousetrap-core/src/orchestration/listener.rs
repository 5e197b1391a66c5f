use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mousetrap_contracts::MessageQueue;
use mousetrap_model::{ModelError, QueueMessage, ReceivedMessage};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::orchestration::config::OrchestratorConfig;
use crate::orchestration::ingest::{IngestOutcome, IngestionPipeline};

/// Validate a raw queue body. A body that is not JSON or lacks a non-empty
/// `filePath` string is a poison message.
pub fn parse_message(body: &str) -> std::result::Result<QueueMessage, ModelError> {
    let message: QueueMessage = serde_json::from_str(body)
        .map_err(|err| ModelError::InvalidMessage(err.to_string()))?;
    if message.file_path.trim().is_empty() {
        return Err(ModelError::InvalidMessage("empty filePath".into()));
    }
    Ok(message)
}

/// What one receive cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub created: usize,
    pub missing: usize,
    pub discarded: usize,
    pub failed: usize,
}

/// Long-running consumer feeding queue messages into the
/// [`IngestionPipeline`].
pub struct QueueListener {
    queue: Arc<dyn MessageQueue>,
    pipeline: Arc<IngestionPipeline>,
    batch_size: usize,
    poll_interval: Duration,
    error_backoff: Duration,
    recovery_interval: Duration,
}

impl fmt::Debug for QueueListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueListener")
            .field("queue", &type_name_of_val(self.queue.as_ref()))
            .field("batch_size", &self.batch_size)
            .field("poll_interval", &self.poll_interval)
            .field("error_backoff", &self.error_backoff)
            .field("recovery_interval", &self.recovery_interval)
            .finish()
    }
}

impl QueueListener {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        pipeline: Arc<IngestionPipeline>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            queue,
            pipeline,
            batch_size: config.queue_batch_size.max(1),
            poll_interval: config.queue_poll_interval(),
            error_backoff: config.queue_error_backoff(),
            recovery_interval: config.queue_recovery_interval(),
        }
    }

    /// Receive one batch and process every message in it.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let messages = self.queue.receive(self.batch_size).await?;
        let mut report = PollReport {
            received: messages.len(),
            ..PollReport::default()
        };
        for message in messages {
            self.handle(message, &mut report).await;
        }
        Ok(report)
    }

    async fn handle(&self, message: ReceivedMessage, report: &mut PollReport) {
        let parsed = match parse_message(&message.body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    target: "mousetrap::queue",
                    handle = %message.handle,
                    error = %err,
                    "discarding poison message"
                );
                report.discarded += 1;
                if let Err(err) = self.queue.delete(&message.handle).await {
                    warn!(
                        target: "mousetrap::queue",
                        handle = %message.handle,
                        error = %err,
                        "failed to delete poison message"
                    );
                }
                return;
            }
        };

        debug!(
            target: "mousetrap::queue",
            file = %parsed.file_path,
            channels = parsed.notify_channels.len(),
            "received scan request"
        );
        match self
            .pipeline
            .ingest(parsed, &message.handle, self.queue.as_ref())
            .await
        {
            Ok(IngestOutcome::Created(_)) => report.created += 1,
            Ok(IngestOutcome::FileMissing(_)) => report.missing += 1,
            Err(_) => report.failed += 1,
        }
    }

    /// Sweep messages held by stopped consumers back onto the queue.
    /// Failures are logged; the next sweep retries.
    pub async fn recover(&self) -> usize {
        match self.queue.recover_abandoned().await {
            Ok(moved) => {
                if moved > 0 {
                    info!(
                        target: "mousetrap::queue",
                        step = "recover_abandoned",
                        moved,
                        "returned abandoned messages to the queue"
                    );
                }
                moved
            }
            Err(err) => {
                warn!(
                    target: "mousetrap::queue",
                    step = "recover_abandoned",
                    error = %err,
                    "failed to recover abandoned messages"
                );
                0
            }
        }
    }

    /// Poll until `shutdown` fires, sweeping abandoned messages every
    /// recovery interval.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(target: "mousetrap::queue", "queue listener started");
        self.recover().await;
        let mut last_recovery = Instant::now();
        loop {
            if last_recovery.elapsed() >= self.recovery_interval {
                self.recover().await;
                last_recovery = Instant::now();
            }

            let wait = match self.poll_once().await {
                Ok(report) if report.received == 0 => self.poll_interval,
                Ok(report) => {
                    debug!(target: "mousetrap::queue", ?report, "processed batch");
                    Duration::ZERO
                }
                Err(err) => {
                    warn!(
                        target: "mousetrap::queue",
                        error = %err,
                        backoff_ms = self.error_backoff.as_millis() as u64,
                        "queue receive failed"
                    );
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(target: "mousetrap::queue", "queue listener shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
