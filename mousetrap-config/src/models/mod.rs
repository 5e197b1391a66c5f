pub mod backends;

use mousetrap_core::OrchestratorConfig;
use serde::{Deserialize, Serialize};

use crate::util::redact_url;
use backends::{ClamdConfig, NotifierConfig, QueueConfig, StorageConfig, StoreConfig};

/// Complete worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// Scheduler, reaper, and queue listener timing.
    pub orchestrator: OrchestratorConfig,
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    /// Notification providers, tried in order for each channel.
    pub notifiers: Vec<NotifierConfig>,
    pub clamd: ClamdConfig,
}

impl Config {
    /// Copy safe to print: credentials in connection URLs are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let StoreConfig::Postgres { url, .. } = &mut copy.store {
            *url = redact_url(url);
        }
        if let QueueConfig::Redis { url, .. } = &mut copy.queue {
            *url = redact_url(url);
        }
        copy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
