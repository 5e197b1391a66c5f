//! Trait surfaces that describe the collaborators of the Mousetrap
//! orchestrator.
//!
//! Every contract is object safe and consumed as `Arc<dyn Trait>`, so a
//! backend is chosen once at startup and never inspected at runtime.
#![allow(missing_docs)]

pub mod engine;
pub mod error;
pub mod notifier;
pub mod queue;
pub mod storage;
pub mod store;

pub use engine::ScanEngine;
pub use error::{BackendError, Result};
pub use notifier::Notifier;
pub use queue::MessageQueue;
pub use storage::{ByteStream, ObjectStorage};
pub use store::TaskStore;

/// Frequently used imports for backend implementations.
pub mod prelude {
    pub use super::{
        BackendError, ByteStream, MessageQueue, Notifier, ObjectStorage,
        ScanEngine, TaskStore,
    };
    pub use mousetrap_model::{
        EpochMillis, ErrorNotification, FileMetadata, NewTask, ReceiptHandle,
        ReceivedMessage, ScanNotification, ScanResult, ScanState, Task,
        TaskTransition, Verdict,
    };
}
