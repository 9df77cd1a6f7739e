use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Operation '{op}' timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Whether the caller may retry the same operation
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Storage(_) | RepositoryError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = RepositoryError::Timeout {
            op: "pushed",
            after: Duration::from_millis(10),
        };
        assert!(timeout.is_transient());
        assert!(RepositoryError::Storage(StoreError::Poisoned).is_transient());
        assert!(!RepositoryError::Internal("join".into()).is_transient());
    }
}
