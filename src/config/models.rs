use crate::humanize::HumanDuration;
use crate::repository::IndexKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub trimmer: TrimmerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Dashboard API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Storage backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Fjall,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_fjall_path")]
    pub path: PathBuf,
    /// Upper bound for any single repository operation
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: HumanDuration,
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_fjall_path(),
            operation_timeout: default_operation_timeout(),
            lock_stripes: default_lock_stripes(),
        }
    }
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/jobledger")
}

fn default_operation_timeout() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_lock_stripes() -> usize {
    64
}

/// Retention horizon for one index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetentionPolicy {
    /// Entries older than this are evicted
    pub max_age: HumanDuration,
    /// Hard cap on entries, oldest evicted first
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl RetentionPolicy {
    pub const fn minutes(mins: u64) -> Self {
        Self {
            max_age: HumanDuration::from_mins(mins),
            max_entries: None,
        }
    }
}

/// Retention configuration, one policy per index
///
/// `silenced` shares the `completed` policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_short_retention")]
    pub recent: RetentionPolicy,
    #[serde(default = "default_short_retention")]
    pub pending: RetentionPolicy,
    #[serde(default = "default_short_retention")]
    pub completed: RetentionPolicy,
    #[serde(default = "default_long_retention")]
    pub recent_failed: RetentionPolicy,
    #[serde(default = "default_long_retention")]
    pub failed: RetentionPolicy,
    #[serde(default = "default_long_retention")]
    pub monitored: RetentionPolicy,
}

impl RetentionConfig {
    pub fn policy_for(&self, index: IndexKind) -> RetentionPolicy {
        match index {
            IndexKind::Recent => self.recent,
            IndexKind::Pending => self.pending,
            IndexKind::Completed | IndexKind::Silenced => self.completed,
            IndexKind::Failed => self.failed,
            IndexKind::RecentFailed => self.recent_failed,
            IndexKind::Monitored => self.monitored,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            recent: default_short_retention(),
            pending: default_short_retention(),
            completed: default_short_retention(),
            recent_failed: default_long_retention(),
            failed: default_long_retention(),
            monitored: default_long_retention(),
        }
    }
}

fn default_short_retention() -> RetentionPolicy {
    RetentionPolicy::minutes(60)
}

fn default_long_retention() -> RetentionPolicy {
    RetentionPolicy::minutes(10080) // 7 days
}

/// Search predicate used by pending/completed listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Case-insensitive substring over display name and queue
    #[default]
    Substring,
    /// Exact match against payload tags
    Tag,
}

/// Query configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub search: SearchMode,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            search: SearchMode::default(),
        }
    }
}

fn default_page_size() -> usize {
    50
}

/// Background trimmer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrimmerConfig {
    #[serde(default = "default_trimmer_enabled")]
    pub enabled: bool,
    #[serde(default = "default_trim_interval")]
    pub interval: HumanDuration,
}

impl Default for TrimmerConfig {
    fn default() -> Self {
        Self {
            enabled: default_trimmer_enabled(),
            interval: default_trim_interval(),
        }
    }
}

fn default_trimmer_enabled() -> bool {
    true
}

fn default_trim_interval() -> HumanDuration {
    HumanDuration::from_secs(60)
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.storage.backend, StorageBackend::Fjall);
        assert_eq!(config.storage.operation_timeout, HumanDuration::from_secs(2));
        assert_eq!(config.query.page_size, 50);
        assert_eq!(config.retention.recent.max_age, HumanDuration::from_mins(60));
        assert_eq!(config.retention.failed.max_age, HumanDuration::from_mins(10080));
    }

    #[test]
    fn test_silenced_uses_completed_policy() {
        let mut retention = RetentionConfig::default();
        retention.completed = RetentionPolicy::minutes(5);

        assert_eq!(retention.policy_for(IndexKind::Silenced), RetentionPolicy::minutes(5));
        assert_eq!(retention.policy_for(IndexKind::RecentFailed), RetentionPolicy::minutes(10080));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[retention.recent]
max_age = "15m"
max_entries = 500

[query]
search = "tag"
            "#,
        )
        .unwrap();

        assert_eq!(config.retention.recent.max_age, HumanDuration::from_mins(15));
        assert_eq!(config.retention.recent.max_entries, Some(500));
        assert_eq!(config.retention.pending.max_age, HumanDuration::from_mins(60));
        assert_eq!(config.query.search, SearchMode::Tag);
        assert_eq!(config.query.page_size, 50);
    }
}
