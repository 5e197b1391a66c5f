//! Wires the worker together and runs it until a shutdown signal.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use mousetrap_config::Config;
use mousetrap_core::{IngestionPipeline, QueueListener, TaskOrchestrator};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::infra::app_state::AppState;
use crate::infra::factory::Backends;
use crate::routes::create_app;

/// Everything one worker process runs.
pub struct Worker {
    pub state: AppState,
    listener: Option<Arc<QueueListener>>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("state", &self.state)
            .field("listener", &self.listener)
            .finish()
    }
}

impl Worker {
    pub fn new(config: &Config, backends: Backends) -> Self {
        let Backends {
            store,
            storage,
            queue,
            notifiers,
            engine,
        } = backends;

        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            notifiers.clone(),
        ));
        let orchestrator = Arc::new(TaskOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&store),
            storage,
            Arc::clone(&engine),
            notifiers,
        ));
        let listener = queue.map(|queue| {
            Arc::new(QueueListener::new(
                queue,
                Arc::clone(&pipeline),
                &config.orchestrator,
            ))
        });

        Self {
            state: AppState::new(orchestrator, store, pipeline, engine),
            listener,
        }
    }

    /// Serve HTTP on `bind` and run the background loops until `shutdown`
    /// fires or the scheduler hits a fatal error.
    pub async fn run(
        self,
        bind: &str,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let tcp = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;

        let listener_handle = self.spawn_listener(&shutdown);
        let scheduler_handle = self.spawn_scheduler(&shutdown);
        info!(addr = %bind, "Starting Mousetrap status API");

        let server_shutdown = shutdown.clone();
        axum::serve(tcp, create_app(self.state.clone()))
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
            .context("HTTP server failed")?;

        shutdown.cancel();
        if let Some(handle) = listener_handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "queue listener task panicked");
        }

        let outcome = scheduler_handle
            .await
            .context("scheduler task panicked")?;
        info!("Mousetrap stopped");
        outcome.map_err(Into::into)
    }

    fn spawn_listener(&self, shutdown: &CancellationToken) -> Option<JoinHandle<()>> {
        let Some(listener) = self.listener.clone() else {
            warn!(
                "No queue configured; scan requests are accepted only through POST /api/tasks. Configure a queue for production use."
            );
            return None;
        };
        let token = shutdown.child_token();
        Some(tokio::spawn(async move { listener.run(token).await }))
    }

    fn spawn_scheduler(
        &self,
        shutdown: &CancellationToken,
    ) -> JoinHandle<mousetrap_core::Result<()>> {
        let orchestrator = Arc::clone(&self.state.orchestrator);
        let token = shutdown.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.run(token.clone()).await;
            if let Err(e) = &outcome {
                error!(error = %e, "scheduler stopped on a fatal error");
                token.cancel();
            }
            outcome
        })
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
pub fn install_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler; only Ctrl-C will stop the worker");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
