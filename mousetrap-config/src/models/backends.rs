//! Backend selection. Each collaborator is a tagged table keyed by
//! `backend = "..."`; the server's factory turns it into a concrete
//! implementation once at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_QUEUE_NAME: &str = "mousetrap:scan-requests";
pub const DEFAULT_HEARTBEAT_TTL_MS: u64 = 60_000;

fn default_max_connections() -> u32 {
    5
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_heartbeat_ttl_ms() -> u64 {
    DEFAULT_HEARTBEAT_TTL_MS
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

/// Where task rows live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    /// Process-local; only useful with a single worker.
    #[default]
    Memory,
}

/// Where scanned files are read from and tagged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Local { root: PathBuf },
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("./data"),
        }
    }
}

/// Source of scan requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum QueueConfig {
    Redis {
        url: String,
        #[serde(default = "default_queue_name")]
        name: String,
        /// Owner of this worker's processing list. A random id is used
        /// when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_id: Option<String>,
        /// A worker whose heartbeat is older than this loses its
        /// in-flight messages to the next recovery sweep.
        #[serde(default = "default_heartbeat_ttl_ms")]
        heartbeat_ttl_ms: u64,
    },
    Memory,
    /// No listener; tasks arrive only through the HTTP API.
    #[default]
    None,
}

impl QueueConfig {
    pub fn is_configured(&self) -> bool {
        !matches!(self, QueueConfig::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum NotifierConfig {
    Webhook {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_channel: Option<String>,
        #[serde(default = "default_webhook_timeout_ms")]
        timeout_ms: u64,
    },
}

impl NotifierConfig {
    pub fn name(&self) -> &str {
        match self {
            NotifierConfig::Webhook { name, .. } => name,
        }
    }
}

/// clamd connection and the startup health gate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClamdConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Upper bound on one EICAR health probe, reply included (ms).
    pub health_check_timeout_ms: u64,
    /// Health probes attempted before startup gives up.
    pub startup_attempts: u32,
    /// Pause between failed startup probes (ms).
    pub startup_delay_ms: u64,
    /// Require the EICAR probe to come back infected.
    pub eicar_infected_validation: bool,
}

impl Default for ClamdConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3310,
            connect_timeout_ms: 5_000,
            health_check_timeout_ms: 10_000,
            startup_attempts: 5,
            startup_delay_ms: 5_000,
            eicar_infected_validation: true,
        }
    }
}
