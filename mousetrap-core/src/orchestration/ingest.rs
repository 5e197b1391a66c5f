use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use mousetrap_contracts::{MessageQueue, ObjectStorage, TaskStore};
use mousetrap_model::{
    ErrorCode, ErrorNotification, NewTask, QueueMessage, ReceiptHandle, Task,
};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::orchestration::notify::NotifierSet;
use crate::orchestration::now_millis;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A PENDING row now exists for the path (inserted or overwritten).
    Created(Task),
    /// Storage has no such file; nothing was written.
    FileMissing(String),
}

/// Turns a scan request into a durable PENDING task.
///
/// Re-ingesting a path overwrites its row, so redelivered messages are
/// harmless.
pub struct IngestionPipeline {
    store: Arc<dyn TaskStore>,
    storage: Arc<dyn ObjectStorage>,
    notifiers: NotifierSet,
}

impl fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("storage", &type_name_of_val(self.storage.as_ref()))
            .field("notifiers", &self.notifiers)
            .finish()
    }
}

impl IngestionPipeline {
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

    /// Create the task without notifying anyone about a missing file.
    /// Used by direct API submissions, where the caller gets the answer.
    pub async fn register(&self, request: QueueMessage) -> Result<IngestOutcome> {
        let Some(metadata) = self.storage.metadata(&request.file_path).await?
        else {
            return Ok(IngestOutcome::FileMissing(request.file_path));
        };

        let task = self
            .store
            .create(
                NewTask {
                    file_path: request.file_path,
                    size_mb: metadata.size_mb(),
                    file_hash: metadata.normalized_fingerprint(),
                    notify_channels: request.notify_channels,
                },
                now_millis(),
            )
            .await?;
        info!(
            step = "create_task",
            file = %task.file_path,
            size_mb = task.size_mb,
            success = true,
            "task registered"
        );
        Ok(IngestOutcome::Created(task))
    }

    /// Ingest a queue message and acknowledge it.
    ///
    /// The message is deleted only after the row is written, or right away
    /// when the file does not exist. A failed write leaves it on the queue
    /// for redelivery.
    pub async fn ingest(
        &self,
        message: QueueMessage,
        handle: &ReceiptHandle,
        queue: &dyn MessageQueue,
    ) -> Result<IngestOutcome> {
        let channels = message.notify_channels.clone();
        let outcome = self.register(message).await.inspect_err(|err| {
            error!(
                step = "create_task",
                handle = %handle,
                success = false,
                error = %err,
                "ingestion failed, message left for redelivery"
            )
        })?;

        if let IngestOutcome::FileMissing(path) = &outcome {
            warn!(
                step = "create_task",
                file = %path,
                success = false,
                "file does not exist, discarding request"
            );
            let payload = ErrorNotification::new(
                path.as_str(),
                ErrorCode::FileNotExist,
                now_millis(),
            );
            self.notifiers.notify_error_all(&channels, &payload).await;
        }

        if let Err(err) = queue.delete(handle).await {
            warn!(
                step = "delete_message",
                handle = %handle,
                success = false,
                error = %err,
                "failed to delete queue message"
            );
        }

        Ok(outcome)
    }
}
