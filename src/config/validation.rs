use super::models::{Config, StorageBackend};
use crate::repository::IndexKind;
use thiserror::Error;

pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Page size must be between 1 and {max}: {value}")]
    InvalidPageSize { value: usize, max: usize },

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: String },

    #[error("Retention max_entries must be positive for index '{index}'")]
    InvalidMaxEntries { index: String },

    #[error("Fjall storage requires a non-empty path")]
    EmptyStoragePath,

    #[error("Lock stripes must be positive")]
    InvalidLockStripes,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_storage(config)?;
    validate_retention(config)?;
    validate_query(config)?;
    validate_trimmer(config)?;
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.backend == StorageBackend::Fjall
        && config.storage.path.as_os_str().is_empty()
    {
        return Err(ValidationError::EmptyStoragePath);
    }

    if config.storage.operation_timeout.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "storage.operation_timeout".to_string(),
        });
    }

    if config.storage.lock_stripes == 0 {
        return Err(ValidationError::InvalidLockStripes);
    }

    Ok(())
}

/// Every index needs a positive horizon; silenced shares completed's policy
fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    for index in IndexKind::ALL {
        let policy = config.retention.policy_for(index);

        if policy.max_age.is_zero() {
            return Err(ValidationError::ZeroDuration {
                field: format!("retention.{}.max_age", index),
            });
        }

        if policy.max_entries == Some(0) {
            return Err(ValidationError::InvalidMaxEntries {
                index: index.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_query(config: &Config) -> Result<(), ValidationError> {
    let page_size = config.query.page_size;
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidPageSize {
            value: page_size,
            max: MAX_PAGE_SIZE,
        });
    }
    Ok(())
}

fn validate_trimmer(config: &Config) -> Result<(), ValidationError> {
    if config.trimmer.enabled && config.trimmer.interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "trimmer.interval".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionPolicy;
    use crate::humanize::HumanDuration;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let mut config = Config::default();
        config.query.page_size = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidPageSize { value: 0, .. })
        ));

        config.query.page_size = MAX_PAGE_SIZE + 1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_retention() {
        let mut config = Config::default();
        config.retention.recent_failed = RetentionPolicy {
            max_age: HumanDuration::from_secs(0),
            max_entries: None,
        };

        match validate(&config) {
            Err(ValidationError::ZeroDuration { field }) => {
                assert_eq!(field, "retention.recent_failed.max_age")
            }
            other => panic!("Expected ZeroDuration, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_zero_max_entries() {
        let mut config = Config::default();
        config.retention.monitored.max_entries = Some(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidMaxEntries { .. })
        ));
    }

    #[test]
    fn test_empty_path_only_matters_for_fjall() {
        let mut config = Config::default();
        config.storage.path = PathBuf::new();
        assert!(matches!(validate(&config), Err(ValidationError::EmptyStoragePath)));

        config.storage.backend = StorageBackend::Memory;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_disabled_trimmer_skips_interval_check() {
        let mut config = Config::default();
        config.trimmer.interval = HumanDuration::from_secs(0);
        assert!(validate(&config).is_err());

        config.trimmer.enabled = false;
        assert!(validate(&config).is_ok());
    }
}
