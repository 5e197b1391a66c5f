//! Task orchestration: the poll scheduler and the steps it sequences.
//!
//! Cross-process exclusion rests entirely on the guarded PENDING -> SCANNING
//! write issued by [`claimer::TaskClaimer`]; [`slot::ScanSlot`] only keeps a
//! single process from claiming twice.

pub mod claimer;
pub mod config;
pub mod executor;
pub mod finalizer;
pub mod ingest;
pub mod listener;
pub mod notify;
pub mod reaper;
pub mod scheduler;
pub mod slot;

pub use claimer::{ClaimOutcome, TaskClaimer};
pub use config::OrchestratorConfig;
pub use executor::{ScanExecutor, ScanFailure, ScanOutcome};
pub use finalizer::Finalizer;
pub use ingest::{IngestOutcome, IngestionPipeline};
pub use listener::{PollReport, QueueListener, parse_message};
pub use notify::NotifierSet;
pub use reaper::StaleTaskReaper;
pub use scheduler::{OrchestratorSnapshot, TaskOrchestrator, TickReport};
pub use slot::{ScanSlot, SlotGuard};

use mousetrap_model::EpochMillis;

/// Wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}
