#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mousetrap_contracts::{
    BackendError, ByteStream, Notifier, ObjectStorage, Result, ScanEngine,
    TaskStore,
};
use mousetrap_core::infra::{InMemoryQueue, InMemoryStorage, InMemoryTaskStore};
use mousetrap_core::orchestration::{
    IngestionPipeline, NotifierSet, OrchestratorConfig, QueueListener,
    TaskOrchestrator,
};
use mousetrap_model::{
    EpochMillis, ErrorNotification, FileMetadata, NewTask, ScanNotification,
    ScanResult, ScanState, Task, TaskTransition, Verdict,
};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

pub const DEFAULT_CHANNEL: &str = "https://hooks.test/default";

/// Notifier that records every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    default_channel: Option<String>,
    pub scans: Mutex<Vec<(String, ScanNotification)>>,
    pub errors: Mutex<Vec<(String, ErrorNotification)>>,
}

impl RecordingNotifier {
    pub fn with_default(channel: &str) -> Self {
        Self {
            default_channel: Some(channel.to_string()),
            ..Self::default()
        }
    }

    pub async fn scans(&self) -> Vec<(String, ScanNotification)> {
        self.scans.lock().await.clone()
    }

    pub async fn errors(&self) -> Vec<(String, ErrorNotification)> {
        self.errors.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn default_channel(&self) -> Option<&str> {
        self.default_channel.as_deref()
    }

    fn accepts(&self, _channel: &str) -> bool {
        true
    }

    async fn notify(&self, channel: &str, payload: &ScanNotification) -> Result<()> {
        self.scans
            .lock()
            .await
            .push((channel.to_string(), payload.clone()));
        Ok(())
    }

    async fn notify_error(
        &self,
        channel: &str,
        payload: &ErrorNotification,
    ) -> Result<()> {
        self.errors
            .lock()
            .await
            .push((channel.to_string(), payload.clone()));
        Ok(())
    }
}

/// Notifier whose deliveries always fail.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    fn default_channel(&self) -> Option<&str> {
        Some("https://hooks.test/broken")
    }

    fn accepts(&self, channel: &str) -> bool {
        channel.ends_with("/broken")
    }

    async fn notify(&self, _channel: &str, _payload: &ScanNotification) -> Result<()> {
        Err(BackendError::Unavailable("notifier down".into()))
    }

    async fn notify_error(
        &self,
        _channel: &str,
        _payload: &ErrorNotification,
    ) -> Result<()> {
        Err(BackendError::Unavailable("notifier down".into()))
    }
}

/// Engine returning a fixed verdict after an optional delay.
pub struct ScriptedEngine {
    verdict: Verdict,
    delay: Duration,
    pub calls: AtomicUsize,
    pub completed: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanEngine for ScriptedEngine {
    async fn scan(&self, mut stream: ByteStream) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut sink = Vec::new();
        stream.read_to_end(&mut sink).await?;
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Storage wrapper whose tagging always fails.
pub struct TagFailingStorage(pub InMemoryStorage);

#[async_trait]
impl ObjectStorage for TagFailingStorage {
    async fn metadata(&self, path: &str) -> Result<Option<FileMetadata>> {
        self.0.metadata(path).await
    }

    async fn open_stream(&self, path: &str) -> Result<ByteStream> {
        self.0.open_stream(path).await
    }

    async fn tag(&self, _path: &str, _result: ScanResult, _ts: EpochMillis) -> Result<()> {
        Err(BackendError::Unavailable("tagging disabled".into()))
    }
}

/// Store whose table "does not exist".
pub struct MissingTableStore;

#[async_trait]
impl TaskStore for MissingTableStore {
    async fn list_by_states(&self, _states: &[ScanState]) -> Result<Vec<Task>> {
        Err(BackendError::Misconfigured("scan_tasks does not exist".into()))
    }

    async fn get(&self, _file_path: &str) -> Result<Option<Task>> {
        Err(BackendError::Misconfigured("scan_tasks does not exist".into()))
    }

    async fn create(&self, _task: NewTask, _created_ts: EpochMillis) -> Result<Task> {
        Err(BackendError::Misconfigured("scan_tasks does not exist".into()))
    }

    async fn transition(
        &self,
        _file_path: &str,
        _transition: TaskTransition,
    ) -> Result<Task> {
        Err(BackendError::Misconfigured("scan_tasks does not exist".into()))
    }

    async fn set_terminal(
        &self,
        _file_path: &str,
        _result: ScanResult,
        _viruses: &[String],
        _ts: EpochMillis,
    ) -> Result<Task> {
        Err(BackendError::Misconfigured("scan_tasks does not exist".into()))
    }

    async fn set_failed(
        &self,
        _file_path: &str,
        _ts: EpochMillis,
        _record_result: bool,
    ) -> Result<Task> {
        Err(BackendError::Misconfigured("scan_tasks does not exist".into()))
    }
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_ms: 20,
        busy_backoff_factor: 5,
        stale_after_ms: 60_000,
        scan_timeout_ms: 5_000,
        queue_poll_interval_ms: 10,
        queue_error_backoff_ms: 10,
        ..OrchestratorConfig::default()
    }
}

pub fn megabyte() -> Vec<u8> {
    vec![b'x'; 1024 * 1024]
}

/// One worker wired over in-memory collaborators.
pub struct Harness {
    pub store: InMemoryTaskStore,
    pub storage: InMemoryStorage,
    pub queue: InMemoryQueue,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Arc<ScriptedEngine>,
    pub pipeline: Arc<IngestionPipeline>,
    pub listener: QueueListener,
    pub orchestrator: TaskOrchestrator,
}

impl Harness {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self::with_config(engine, fast_config())
    }

    pub fn with_config(engine: ScriptedEngine, config: OrchestratorConfig) -> Self {
        let store = InMemoryTaskStore::new();
        let storage = InMemoryStorage::new();
        Self::assemble(engine, config, store, storage.clone(), Arc::new(storage))
    }

    /// Same wiring, but the orchestrator sees `storage` instead of the plain
    /// in-memory backend.
    pub fn with_storage(
        engine: ScriptedEngine,
        storage: InMemoryStorage,
        wrapped: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self::assemble(engine, fast_config(), InMemoryTaskStore::new(), storage, wrapped)
    }

    fn assemble(
        engine: ScriptedEngine,
        config: OrchestratorConfig,
        store: InMemoryTaskStore,
        storage: InMemoryStorage,
        orchestrator_storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let queue = InMemoryQueue::new();
        let notifier = Arc::new(RecordingNotifier::with_default(DEFAULT_CHANNEL));
        let engine = Arc::new(engine);
        let notifiers = NotifierSet::new(vec![notifier.clone() as Arc<dyn Notifier>]);

        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::new(store.clone()),
            Arc::new(storage.clone()),
            notifiers.clone(),
        ));
        let listener = QueueListener::new(
            Arc::new(queue.clone()),
            Arc::clone(&pipeline),
            &config,
        );
        let orchestrator = TaskOrchestrator::new(
            config,
            Arc::new(store.clone()),
            orchestrator_storage,
            engine.clone(),
            notifiers,
        );

        Self {
            store,
            storage,
            queue,
            notifier,
            engine,
            pipeline,
            listener,
            orchestrator,
        }
    }

    pub async fn task(&self, path: &str) -> Option<Task> {
        self.store.get(path).await.unwrap()
    }

    /// Seed a PENDING row directly, bypassing the queue.
    pub async fn seed_pending(&self, path: &str, created_ts: EpochMillis) -> Task {
        self.store
            .create(
                NewTask {
                    file_path: path.to_string(),
                    size_mb: 1.0,
                    file_hash: "seed".into(),
                    notify_channels: vec![],
                },
                created_ts,
            )
            .await
            .unwrap()
    }
}
