//! Core data model definitions shared across Mousetrap crates.
#![allow(missing_docs)]

pub mod error;
pub mod notification;
pub mod queue;
pub mod scan;
pub mod storage;
pub mod task;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use notification::{ErrorCode, ErrorDetail, ErrorNotification, ScanNotification};
pub use queue::{QueueMessage, ReceiptHandle, ReceivedMessage};
pub use scan::{ScanResult, ScanState, Verdict};
pub use storage::{FileMetadata, RESULT_TAG, TIMESTAMP_TAG};
pub use task::{NewTask, Task, TaskTransition, UNSET_TS};

/// Milliseconds since the Unix epoch, the unit every stored timestamp uses.
pub type EpochMillis = i64;
