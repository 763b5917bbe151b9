//! Error types shared across the whole workspace.
//!
//! Every crate (`orchestrator-core`, `orchestrator-rules`,
//! `orchestrator-protocol`) returns this single error enum so that the
//! `protocol` facade can render a uniform `{success, error}` envelope
//! without knowing which subsystem produced the failure.

use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Every error kind named in the system's error handling design.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Tree not found: {0}")]
    TreeNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Context not found: {0}")]
    ContextNotFound(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Composition conflict: {0}")]
    CompositionConflict(String),

    #[error("Authentication failure: {0}")]
    AuthFailure(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("I/O failure: {0}")]
    IOFailure(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),
}

impl OrchestratorError {
    pub fn task_not_found(id: impl std::fmt::Display) -> Self {
        Self::TaskNotFound(format!("no task with id '{id}'"))
    }

    pub fn empty_field(field: &str) -> Self {
        Self::Validation(format!("field '{field}' cannot be empty"))
    }

    /// Kind name used as the `<kind>:` prefix in `{success:false, error:
    /// "<kind>: <message>"}` envelopes (§7 propagation policy).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskNotFound(_) => "NotFound",
            Self::ProjectNotFound(_) => "NotFound",
            Self::TreeNotFound(_) => "NotFound",
            Self::AgentNotFound(_) => "NotFound",
            Self::ContextNotFound(_) => "NotFound",
            Self::RuleNotFound(_) => "NotFound",
            Self::Validation(_) => "Validation",
            Self::DependencyCycle(_) => "DependencyCycle",
            Self::DuplicateId(_) => "DuplicateId",
            Self::IntegrityViolation(_) => "IntegrityViolation",
            Self::FormatError(_) => "FormatError",
            Self::CompositionConflict(_) => "CompositionConflict",
            Self::AuthFailure(_) => "AuthFailure",
            Self::RateLimited(_) => "RateLimited",
            Self::Timeout(_) => "Timeout",
            Self::IOFailure(_) => "IOFailure",
            Self::Cancelled(_) => "Cancelled",
            Self::ConfigError(_) => "ConfigError",
            Self::PathNotFound(_) => "PathNotFound",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == "NotFound"
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        Self::IOFailure(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::FormatError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_prefixes_error_message() {
        let err = OrchestratorError::task_not_found("T1");
        assert_eq!(err.kind(), "NotFound");
        assert!(err.is_not_found());
    }

    #[test]
    fn empty_field_is_validation() {
        let err = OrchestratorError::empty_field("title");
        assert_eq!(err.kind(), "Validation");
    }
}
