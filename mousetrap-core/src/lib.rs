//! # Mousetrap Core
//!
//! Orchestration for the Mousetrap scan service. Many worker processes
//! share one task table and one queue; a guarded state write is the only
//! synchronisation between them.
//!
//! - [`orchestration`]: scheduler, claimer, executor, finalizer, reaper,
//!   ingestion pipeline and queue listener
//! - [`infra`]: task store, object storage, queue, notifier and scan engine
//!   backends
//!
//! ## Feature Flags
//!
//! - `database`: Postgres task store and Redis queue (default)
//! - `postgres-tests`: runs the `sqlx::test` suites against `DATABASE_URL`
//! - `redis-tests`: runs the Redis queue suite against `REDIS_URL`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod error;
pub mod infra;
pub mod orchestration;

pub use error::{MousetrapError, Result};
pub use orchestration::{
    IngestionPipeline, NotifierSet, OrchestratorConfig, QueueListener,
    TaskOrchestrator,
};

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
