use thiserror::Error;

/// Result alias used across the retention crates.
pub type Result<T> = std::result::Result<T, RetentionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetentionError {
    /// Bad rule, template, selector, or trigger. Rejected at create/update.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dangling scope reference. Aborts execution start.
    #[error("Scope not found: {0}")]
    ScopeNotFound(String),

    /// A non-terminal execution already exists for the policy.
    #[error("Policy {policy_id} already has execution {execution_id} in flight")]
    Conflict { policy_id: i64, execution_id: i64 },

    /// Registry catalog or delete failure.
    #[error("External I/O error: {0}")]
    ExternalIo(String),

    /// Store unavailable or rejected the write.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
}

impl RetentionError {
    pub fn config(msg: impl Into<String>) -> Self {
        RetentionError::Configuration(msg.into())
    }

    pub fn not_found(kind: &'static str, id: i64) -> Self {
        RetentionError::NotFound { kind, id }
    }

    /// Only registry I/O is worth retrying; everything else is deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(self, RetentionError::ExternalIo(_))
    }
}

impl From<serde_json::Error> for RetentionError {
    fn from(e: serde_json::Error) -> Self {
        RetentionError::Persistence(format!("document encoding: {e}"))
    }
}
