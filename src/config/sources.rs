use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "JOBLEDGER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/jobledger.toml";
const ENV_PREFIX: &str = "JOBLEDGER";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // JOBLEDGER__STORAGE__OPERATION_TIMEOUT -> storage.operation_timeout
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SearchMode, StorageBackend};
    use crate::humanize::HumanDuration;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.query.page_size, 50);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[storage]
backend = "memory"
operation_timeout = "750ms"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(
            config.storage.operation_timeout.as_duration(),
            std::time::Duration::from_millis(750)
        );
    }

    // Environment overrides are not exercised here: env::set_var is unsafe
    // under the 2024 edition and leaks between parallel tests.

    #[test]
    fn test_complex_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"

[storage]
backend = "fjall"
path = "data/ledger"
operation_timeout = "5s"
lock_stripes = 128

[retention.recent]
max_age = "30m"
max_entries = 10000

[retention.failed]
max_age = "14d"

[retention.monitored]
max_age = "7d"

[query]
page_size = 25
search = "substring"

[trimmer]
enabled = false
interval = "5m"

[telemetry]
log_level = "jobledger=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();

        assert_eq!(config.storage.path, PathBuf::from("data/ledger"));
        assert_eq!(config.storage.lock_stripes, 128);
        assert_eq!(config.retention.recent.max_entries, Some(10000));
        assert_eq!(config.retention.failed.max_age, HumanDuration::from_mins(14 * 24 * 60));
        assert_eq!(config.retention.completed.max_age, HumanDuration::from_mins(60));
        assert_eq!(config.query.page_size, 25);
        assert_eq!(config.query.search, SearchMode::Substring);
        assert!(!config.trimmer.enabled);
        assert_eq!(config.trimmer.interval, HumanDuration::from_mins(5));
        assert_eq!(config.telemetry.log_level, "jobledger=debug");
    }
}
