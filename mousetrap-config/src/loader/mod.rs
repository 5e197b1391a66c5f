pub mod error;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::Config;
use crate::models::backends::{
    DEFAULT_HEARTBEAT_TTL_MS, DEFAULT_QUEUE_NAME, QueueConfig, StoreConfig,
};
use crate::util::non_empty;
use crate::validation::{self, ConfigWarnings};
use error::ConfigLoadError;

const DEFAULT_CANDIDATES: &[&str] = &[
    "mousetrap.toml",
    "mousetrap.json",
    "config/mousetrap.toml",
    "config/mousetrap.json",
];

/// Source that produced the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// `--config` on the command line.
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Environment variables consulted by the loader.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_path: Option<String>,
    pub config_json: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub clamd_host: Option<String>,
    pub clamd_port: Option<String>,
    pub server_host: Option<String>,
    pub server_port: Option<String>,
}

impl EnvOverrides {
    pub fn gather() -> Self {
        let var = |name: &str| non_empty(std::env::var(name).ok());
        Self {
            config_path: var("MOUSETRAP_CONFIG_PATH"),
            config_json: var("MOUSETRAP_CONFIG_JSON"),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            clamd_host: var("CLAMD_HOST"),
            clamd_port: var("CLAMD_PORT"),
            server_host: var("SERVER_HOST"),
            server_port: var("SERVER_PORT"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Directory searched for the default config files. Defaults to the
    /// working directory.
    pub search_dir: Option<PathBuf>,
    /// Use these instead of reading the process environment.
    pub env: Option<EnvOverrides>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub source: ConfigSource,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_search_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.options.search_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.options.env = Some(env);
        self
    }

    /// Evaluation order:
    /// 1) `--config`, then `$MOUSETRAP_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$MOUSETRAP_CONFIG_JSON` (inline JSON),
    /// 3) the first default file found,
    /// 4) built-in defaults.
    ///
    /// Environment overrides are applied on top, then the guard rails run.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let env = self
            .options
            .env
            .clone()
            .unwrap_or_else(EnvOverrides::gather);

        let (mut config, source) = self.resolve(&env)?;
        debug!(?source, env_file_loaded, "configuration source resolved");

        apply_overrides(&mut config, &env)?;

        let mut warnings = ConfigWarnings::default();
        if source == ConfigSource::Default {
            warnings.push_with_hint(
                "No mousetrap.toml detected; using built-in defaults and environment variables",
                "Set MOUSETRAP_CONFIG_PATH or pass --config to point at a configuration file",
            );
        }
        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad {
            config,
            source,
            warnings,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err.into()),
        })
    }

    fn resolve(
        &self,
        env: &EnvOverrides,
    ) -> Result<(Config, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.options.config_path {
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        if let Some(raw) = &env.config_path {
            let path = PathBuf::from(raw);
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = &env.config_json {
            let config = parse_json(raw, "MOUSETRAP_CONFIG_JSON")?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Config::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let base = self
            .options
            .search_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.is_file())
    }
}

pub fn load_from_file(path: &Path) -> Result<Config, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::MissingConfig {
            path: path.to_path_buf(),
        });
    }
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") => toml::from_str(&contents).map_err(|err| {
            ConfigLoadError::Parse {
                origin,
                reason: err.to_string(),
            }
        }),
        _ => parse_from_str(&contents, &origin),
    }
}

/// Try TOML first, then JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            reason: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

fn parse_json(raw: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    serde_json::from_str(raw).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        reason: err.to_string(),
    })
}

fn apply_overrides(
    config: &mut Config,
    env: &EnvOverrides,
) -> Result<(), ConfigLoadError> {
    if let Some(url) = &env.database_url {
        let max_connections = match &config.store {
            StoreConfig::Postgres {
                max_connections, ..
            } => *max_connections,
            StoreConfig::Memory => 5,
        };
        config.store = StoreConfig::Postgres {
            url: url.clone(),
            max_connections,
        };
    }

    if let Some(url) = &env.redis_url {
        config.queue = match std::mem::take(&mut config.queue) {
            QueueConfig::Redis {
                name,
                worker_id,
                heartbeat_ttl_ms,
                ..
            } => QueueConfig::Redis {
                url: url.clone(),
                name,
                worker_id,
                heartbeat_ttl_ms,
            },
            _ => QueueConfig::Redis {
                url: url.clone(),
                name: DEFAULT_QUEUE_NAME.to_string(),
                worker_id: None,
                heartbeat_ttl_ms: DEFAULT_HEARTBEAT_TTL_MS,
            },
        };
    }

    if let Some(host) = &env.clamd_host {
        config.clamd.host = host.clone();
    }
    if let Some(raw) = &env.clamd_port {
        config.clamd.port = parse_port("CLAMD_PORT", raw)?;
    }
    if let Some(host) = &env.server_host {
        config.server.host = host.clone();
    }
    if let Some(raw) = &env.server_port {
        config.server.port = parse_port("SERVER_PORT", raw)?;
    }
    Ok(())
}

fn parse_port(name: &'static str, raw: &str) -> Result<u16, ConfigLoadError> {
    raw.parse().map_err(|_| ConfigLoadError::InvalidOverride {
        name,
        value: raw.to_string(),
    })
}
