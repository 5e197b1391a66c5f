//! Shared configuration library for Mousetrap.
//!
//! Loads the worker configuration from a TOML or JSON file (or inline JSON in
//! the environment), applies environment overrides for connection strings,
//! and runs the guard rails that reject unusable settings before any backend
//! is contacted.

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigSource, EnvOverrides,
    error::ConfigLoadError,
};
pub use models::backends::{
    ClamdConfig, NotifierConfig, QueueConfig, StorageConfig, StoreConfig,
};
pub use models::{Config, ServerConfig};
pub use mousetrap_core::OrchestratorConfig;
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
