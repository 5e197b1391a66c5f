use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use mousetrap_contracts::{ScanEngine, TaskStore};
use mousetrap_core::{IngestionPipeline, TaskOrchestrator};

/// Shared handles for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub store: Arc<dyn TaskStore>,
    pub pipeline: Arc<IngestionPipeline>,
    pub engine: Arc<dyn ScanEngine>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("engine", &type_name_of_val(self.engine.as_ref()))
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        orchestrator: Arc<TaskOrchestrator>,
        store: Arc<dyn TaskStore>,
        pipeline: Arc<IngestionPipeline>,
        engine: Arc<dyn ScanEngine>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            pipeline,
            engine,
        }
    }
}
