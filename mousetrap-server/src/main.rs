//! # Mousetrap Server
//!
//! Malware-scan worker. Each process claims at most one PENDING task at a
//! time from the shared task table, streams the file through clamd, tags the
//! object with the verdict, and notifies subscribers. Run as many processes
//! as throughput requires; the guarded claim keeps them from scanning the
//! same file twice.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use mousetrap_config::{Config, ConfigLoad, ConfigLoader, StoreConfig};
use mousetrap_core::{MIGRATOR, infra::PostgresTaskStore};
use mousetrap_server::infra::{
    factory::Backends,
    runtime::{Worker, install_signal_handler},
    startup::wait_for_engine,
    telemetry::init_tracing,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "mousetrap-server")]
#[command(about = "Malware-scan worker backed by clamd", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the worker (default)
    Serve,
    /// Load and validate the configuration, print it, and exit
    CheckConfig,
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        None | Some(Command::Serve) => run_server(&cli.serve).await,
        Some(Command::CheckConfig) => check_config(&cli.serve),
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(&cli.serve).await,
    }
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        source,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    info!(source = ?source, "configuration loaded");
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    let orchestrator = &config.orchestrator;
    info!(
        orchestrator.poll_interval_ms = orchestrator.poll_interval_ms,
        orchestrator.busy_backoff_factor = orchestrator.busy_backoff_factor,
        orchestrator.stale_after_ms = orchestrator.stale_after_ms,
        orchestrator.scan_timeout_ms = orchestrator.scan_timeout_ms,
        orchestrator.max_scan_attempts = orchestrator.max_scan_attempts,
        "orchestrator configuration in effect"
    );

    Ok(config)
}

fn check_config(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let rendered = toml::to_string_pretty(&config.redacted())
        .context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

async fn run_db_migrate(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let StoreConfig::Postgres {
        url,
        max_connections,
    } = &config.store
    else {
        bail!("db migrate requires a postgres store; set DATABASE_URL or [store] backend = \"postgres\"");
    };

    let store = PostgresTaskStore::connect(url, *max_connections)
        .await
        .context("failed to connect to PostgreSQL for migration")?;
    MIGRATOR
        .run(store.pool())
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_server(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let shutdown = CancellationToken::new();
    install_signal_handler(shutdown.clone());

    let backends = Backends::from_config(&config).await?;
    wait_for_engine(
        backends.engine.as_ref(),
        config.clamd.startup_attempts,
        Duration::from_millis(config.clamd.startup_delay_ms),
        &shutdown,
    )
    .await
    .with_context(|| {
        format!(
            "clamd at {}:{} is not usable",
            config.clamd.host, config.clamd.port
        )
    })?;

    Worker::new(&config, backends)
        .run(&config.server.bind_address(), shutdown)
        .await
}
