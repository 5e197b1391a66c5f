use async_trait::async_trait;
use mousetrap_model::{ReceiptHandle, ReceivedMessage};

use crate::error::Result;

/// At-least-once message source feeding the ingestion pipeline.
///
/// A received message stays owned by the queue until it is deleted; a
/// message that is never deleted is eventually redelivered.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Up to `max` raw messages. An empty vec means the queue is idle.
    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>>;

    async fn delete(&self, handle: &ReceiptHandle) -> Result<()>;

    /// Return messages held by consumers that stopped to the main queue.
    /// Returns how many were moved. Queues with built-in visibility
    /// timeouts have nothing to do.
    async fn recover_abandoned(&self) -> Result<usize> {
        Ok(0)
    }
}
