//! Builds the configured backends once at startup.

use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mousetrap_config::{
    ClamdConfig, Config, NotifierConfig, QueueConfig, StorageConfig,
    StoreConfig,
};
use mousetrap_contracts::{
    MessageQueue, Notifier, ObjectStorage, ScanEngine, TaskStore,
};
use mousetrap_core::NotifierSet;
use mousetrap_core::infra::{
    ClamdEngine, InMemoryQueue, InMemoryStorage, InMemoryTaskStore,
    LocalStorage, PostgresTaskStore, RedisQueue, WebhookNotifier,
};
use tracing::{info, warn};
use uuid::Uuid;

pub struct Backends {
    pub store: Arc<dyn TaskStore>,
    pub storage: Arc<dyn ObjectStorage>,
    /// `None` when requests only arrive through the HTTP API.
    pub queue: Option<Arc<dyn MessageQueue>>,
    pub notifiers: NotifierSet,
    pub engine: Arc<dyn ScanEngine>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("storage", &type_name_of_val(self.storage.as_ref()))
            .field(
                "queue",
                &self.queue.as_ref().map(|q| type_name_of_val(q.as_ref())),
            )
            .field("notifiers", &self.notifiers)
            .field("engine", &type_name_of_val(self.engine.as_ref()))
            .finish()
    }
}

impl Backends {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            store: build_store(&config.store).await?,
            storage: build_storage(&config.storage),
            queue: build_queue(&config.queue).await?,
            notifiers: build_notifiers(&config.notifiers)?,
            engine: Arc::new(build_engine(&config.clamd)),
        })
    }
}

pub async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn TaskStore>> {
    match config {
        StoreConfig::Postgres {
            url,
            max_connections,
        } => {
            let store = PostgresTaskStore::connect(url, *max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            store.verify_schema().await.context(
                "scan_tasks table missing; run `mousetrap-server db migrate`",
            )?;
            info!(max_connections, "task store: postgres");
            Ok(Arc::new(store))
        }
        StoreConfig::Memory => {
            warn!("task store: in-memory; tasks are lost on restart");
            Ok(Arc::new(InMemoryTaskStore::new()))
        }
    }
}

pub fn build_storage(config: &StorageConfig) -> Arc<dyn ObjectStorage> {
    match config {
        StorageConfig::Local { root } => {
            info!(root = %root.display(), "object storage: local filesystem");
            Arc::new(LocalStorage::new(root.clone()))
        }
        StorageConfig::Memory => {
            warn!("object storage: in-memory");
            Arc::new(InMemoryStorage::new())
        }
    }
}

pub async fn build_queue(
    config: &QueueConfig,
) -> anyhow::Result<Option<Arc<dyn MessageQueue>>> {
    match config {
        QueueConfig::Redis {
            url,
            name,
            worker_id,
            heartbeat_ttl_ms,
        } => {
            let worker_id = worker_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let queue = RedisQueue::connect(url, name, &worker_id)
                .await
                .context("failed to connect to Redis")?
                .with_heartbeat_ttl(Duration::from_millis(*heartbeat_ttl_ms));
            let restored = queue
                .requeue_own()
                .await
                .context("failed to restore in-flight queue messages")?;
            info!(queue = %name, worker = %worker_id, restored, "message queue: redis");
            Ok(Some(Arc::new(queue)))
        }
        QueueConfig::Memory => {
            info!("message queue: in-memory");
            Ok(Some(Arc::new(InMemoryQueue::new())))
        }
        QueueConfig::None => Ok(None),
    }
}

pub fn build_notifiers(configs: &[NotifierConfig]) -> anyhow::Result<NotifierSet> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::with_capacity(configs.len());
    for config in configs {
        match config {
            NotifierConfig::Webhook {
                name,
                default_channel,
                timeout_ms,
            } => {
                let notifier = WebhookNotifier::new(
                    name.clone(),
                    default_channel.clone(),
                    Duration::from_millis(*timeout_ms),
                )
                .with_context(|| format!("invalid webhook notifier `{name}`"))?;
                info!(notifier = %name, default_channel = ?default_channel, "notifier: webhook");
                notifiers.push(Arc::new(notifier));
            }
        }
    }
    Ok(NotifierSet::new(notifiers))
}

pub fn build_engine(config: &ClamdConfig) -> ClamdEngine {
    ClamdEngine::new(config.host.clone(), config.port)
        .with_connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .with_health_check_timeout(Duration::from_millis(config.health_check_timeout_ms))
        .with_eicar_validation(config.eicar_infected_validation)
}
