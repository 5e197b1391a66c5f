//! Concrete collaborator backends. The server picks one per concern at
//! startup from configuration.

pub mod engine;
pub mod notifier;
pub mod queue;
pub mod storage;
pub mod store;

pub use engine::ClamdEngine;
pub use notifier::WebhookNotifier;
#[cfg(feature = "database")]
pub use queue::RedisQueue;
pub use queue::InMemoryQueue;
pub use storage::{InMemoryStorage, LocalStorage};
pub use store::InMemoryTaskStore;
#[cfg(feature = "database")]
pub use store::PostgresTaskStore;
