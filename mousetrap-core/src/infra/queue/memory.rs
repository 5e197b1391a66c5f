use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mousetrap_contracts::{BackendError, MessageQueue, Result};
use mousetrap_model::{ReceiptHandle, ReceivedMessage};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct QueueState {
    ready: VecDeque<String>,
    in_flight: HashMap<String, String>,
}

/// FIFO queue held in memory. Received messages stay in flight until
/// deleted or explicitly requeued.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<QueueState>>,
}

impl fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryQueue");
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("ready", &state.ready.len())
                    .field("in_flight", &state.in_flight.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, body: impl Into<String>) {
        self.state.lock().await.ready.push_back(body.into());
    }

    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Return every undeleted message to the front of the queue, the way a
    /// visibility timeout would.
    pub async fn requeue_in_flight(&self) -> usize {
        let mut state = self.state.lock().await;
        let bodies: Vec<String> = state.in_flight.drain().map(|(_, body)| body).collect();
        let count = bodies.len();
        for body in bodies {
            state.ready.push_front(body);
        }
        count
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let mut state = self.state.lock().await;
        let take = max.min(state.ready.len());
        let mut out = Vec::with_capacity(take);
        for _ in 0..take {
            let Some(body) = state.ready.pop_front() else {
                break;
            };
            let handle = Uuid::new_v4().to_string();
            state.in_flight.insert(handle.clone(), body.clone());
            out.push(ReceivedMessage {
                body,
                handle: ReceiptHandle(handle),
            });
        }
        Ok(out)
    }

    async fn delete(&self, handle: &ReceiptHandle) -> Result<()> {
        self.state
            .lock()
            .await
            .in_flight
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("receipt {handle}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn undeleted_messages_can_be_redelivered() {
        let queue = InMemoryQueue::new();
        queue.push("one").await;
        queue.push("two").await;

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].body, "one");
        queue.delete(&batch[0].handle).await.unwrap();
        assert!(queue.delete(&batch[0].handle).await.is_err());

        assert_eq!(queue.requeue_in_flight().await, 1);
        let again = queue.receive(10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].body, "two");
    }
}
