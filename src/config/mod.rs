//! Configuration management for jobledger
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use jobledger::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Dashboard API listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `JOBLEDGER__<section>__<key>`
//!
//! Examples:
//! - `JOBLEDGER__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `JOBLEDGER__STORAGE__BACKEND=memory`
//! - `JOBLEDGER__QUERY__PAGE_SIZE=100`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/jobledger.toml`.
//! This can be overridden using the `JOBLEDGER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, QueryConfig, RetentionConfig, RetentionPolicy, SearchMode, ServerConfig,
    StorageBackend, StorageConfig, TelemetryConfig, TrimmerConfig,
};
pub use validation::{MAX_PAGE_SIZE, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`JOBLEDGER__*`)
    /// 2. TOML file (default: `config/jobledger.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or
    /// validation fails (zero horizons, invalid page size, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
