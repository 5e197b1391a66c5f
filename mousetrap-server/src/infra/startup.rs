use std::time::Duration;

use mousetrap_contracts::ScanEngine;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineGateError {
    #[error("scan engine not healthy after {attempts} attempts")]
    Unhealthy { attempts: u32 },
    #[error("shutdown requested while waiting for the scan engine")]
    Cancelled,
}

/// Probe the engine until it passes its health check.
///
/// Waits `delay` between failed probes and gives up after `attempts`.
pub async fn wait_for_engine(
    engine: &dyn ScanEngine,
    attempts: u32,
    delay: Duration,
    shutdown: &CancellationToken,
) -> Result<(), EngineGateError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match engine.health_check().await {
            Ok(true) => {
                info!(attempt, step = "engine_health", success = true, "scan engine healthy");
                return Ok(());
            }
            Ok(false) => {
                warn!(attempt, attempts, step = "engine_health", success = false, "scan engine answered but failed validation");
            }
            Err(e) => {
                warn!(attempt, attempts, step = "engine_health", success = false, error = %e, "scan engine unreachable");
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = shutdown.cancelled() => return Err(EngineGateError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
    Err(EngineGateError::Unhealthy { attempts })
}
