use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchlogError {
    #[error("Malformed run: field `{field}` {reason}")]
    MalformedRun { field: String, reason: String },

    #[error("Duplicate commit: {commit} already recorded for tool `{tool}`")]
    DuplicateCommit { commit: String, tool: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchlogError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRun {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Duplicates are safe to treat as an idempotent no-op.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateCommit { .. })
    }
}

pub type Result<T> = std::result::Result<T, BenchlogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_run_message_names_field() {
        let err = BenchlogError::malformed("benches[2].value", "must be non-negative");

        assert_eq!(
            err.to_string(),
            "Malformed run: field `benches[2].value` must be non-negative"
        );
    }

    #[test]
    fn test_duplicate_is_detected() {
        let err = BenchlogError::DuplicateCommit {
            commit: "6b648cf".to_string(),
            tool: "cargo".to_string(),
        };

        assert!(err.is_duplicate());
        assert!(!BenchlogError::StorageUnavailable("disk".into()).is_duplicate());
    }
}
