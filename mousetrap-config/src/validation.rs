use thiserror::Error;
use url::Url;

use crate::models::Config;
use crate::models::backends::{NotifierConfig, QueueConfig, StoreConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("orchestrator.{field} must be greater than zero")]
    ZeroSetting { field: &'static str },
    #[error("notifier `{name}` has an invalid default channel: {reason}")]
    InvalidNotifier { name: String, reason: String },
    #[error("{backend} backend requires a non-empty url")]
    MissingUrl { backend: &'static str },
    #[error("clamd.startup_attempts must be at least 1")]
    NoStartupAttempts,
    #[error("{section}.{field} must be greater than zero")]
    ZeroBackendSetting {
        section: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.items.iter().any(|item| item.message.contains(needle))
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();
    let orchestrator = &config.orchestrator;

    for (field, value) in [
        ("poll_interval_ms", orchestrator.poll_interval_ms),
        ("scan_timeout_ms", orchestrator.scan_timeout_ms),
        ("stale_after_ms", orchestrator.stale_after_ms),
        ("busy_backoff_factor", u64::from(orchestrator.busy_backoff_factor)),
        ("queue_batch_size", orchestrator.queue_batch_size as u64),
        (
            "queue_recovery_interval_ms",
            orchestrator.queue_recovery_interval_ms,
        ),
    ] {
        if value == 0 {
            return Err(ConfigGuardRailError::ZeroSetting { field });
        }
    }

    if orchestrator.stale_after_ms <= orchestrator.scan_timeout_ms {
        warnings.push_with_hint(
            "stale_after_ms is not longer than scan_timeout_ms; live scans may be reclaimed by another worker",
            "Set orchestrator.stale_after_ms comfortably above orchestrator.scan_timeout_ms",
        );
    }

    match &config.store {
        StoreConfig::Postgres { url, .. } if url.trim().is_empty() => {
            return Err(ConfigGuardRailError::MissingUrl {
                backend: "postgres",
            });
        }
        StoreConfig::Memory => warnings.push_with_hint(
            "Using the in-memory task store; tasks are lost on restart and not shared between workers",
            "Set DATABASE_URL or configure [store] backend = \"postgres\"",
        ),
        _ => {}
    }

    match &config.queue {
        QueueConfig::Redis { url, .. } if url.trim().is_empty() => {
            return Err(ConfigGuardRailError::MissingUrl { backend: "redis" });
        }
        QueueConfig::Redis {
            heartbeat_ttl_ms, ..
        } if *heartbeat_ttl_ms == 0 => {
            return Err(ConfigGuardRailError::ZeroBackendSetting {
                section: "queue",
                field: "heartbeat_ttl_ms",
            });
        }
        QueueConfig::Redis {
            heartbeat_ttl_ms, ..
        } if *heartbeat_ttl_ms <= orchestrator.queue_error_backoff_ms => {
            warnings.push_with_hint(
                "queue.heartbeat_ttl_ms is not longer than queue_error_backoff_ms; a worker backing off may lose its in-flight messages",
                "Set queue.heartbeat_ttl_ms well above orchestrator.queue_error_backoff_ms",
            );
        }
        QueueConfig::None => warnings.push_with_hint(
            "No queue configured; scan requests are accepted only through the HTTP API",
            "Set REDIS_URL or configure [queue] backend = \"redis\"",
        ),
        _ => {}
    }

    if config.notifiers.is_empty() {
        warnings.push("No notifiers configured; scan results are only visible in the task store");
    }
    for notifier in &config.notifiers {
        validate_notifier(notifier)?;
    }

    if config.clamd.startup_attempts == 0 {
        return Err(ConfigGuardRailError::NoStartupAttempts);
    }
    for (field, value) in [
        ("connect_timeout_ms", config.clamd.connect_timeout_ms),
        ("health_check_timeout_ms", config.clamd.health_check_timeout_ms),
    ] {
        if value == 0 {
            return Err(ConfigGuardRailError::ZeroBackendSetting {
                section: "clamd",
                field,
            });
        }
    }
    if !config.clamd.eicar_infected_validation {
        warnings.push(
            "clamd EICAR validation disabled; a daemon without signatures will pass the health check",
        );
    }

    Ok(warnings)
}

fn validate_notifier(notifier: &NotifierConfig) -> Result<(), ConfigGuardRailError> {
    let NotifierConfig::Webhook {
        name,
        default_channel,
        ..
    } = notifier;

    let Some(channel) = default_channel else {
        return Ok(());
    };
    let invalid = |reason: String| ConfigGuardRailError::InvalidNotifier {
        name: name.clone(),
        reason,
    };
    let url = Url::parse(channel).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    Ok(())
}
