//! Error types for dealscout.
//!
//! Library crates use [`DealScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`TaskFailure`] is the per-task failure taxonomy. It never escapes the
//! bounded runner: a failed task is logged with its kind and dropped (or
//! degraded, depending on the call site).

use std::path::PathBuf;

/// Top-level error type for all dealscout operations.
#[derive(Debug, thiserror::Error)]
pub enum DealScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during a fetch.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed input (CSV, JSON payload, date, ...).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Language model call rejected, errored, or returned nothing.
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing dataset, bad schema, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Output artifact could not be built or written.
    #[error("artifact error: {0}")]
    Artifact(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DealScoutError>;

impl DealScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error into the per-task failure taxonomy.
    pub fn task_failure(&self) -> TaskFailure {
        match self {
            Self::Network(_) => TaskFailure::Network,
            Self::Parse { .. } => TaskFailure::Parse,
            Self::Llm(_) => TaskFailure::Collaborator,
            _ => TaskFailure::Task,
        }
    }
}

/// Failure kinds a single enrichment task can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFailure {
    /// Timeout, connection refused, non-2xx.
    Network,
    /// Malformed structured payload.
    Parse,
    /// Any other error raised inside the task body.
    Task,
    /// The model call was rejected or errored.
    Collaborator,
}

impl TaskFailure {
    /// Short label used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parse => "parse",
            Self::Task => "task",
            Self::Collaborator => "collaborator",
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DealScoutError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = DealScoutError::validation("registry file not found");
        assert!(err.to_string().contains("registry file"));
    }

    #[test]
    fn errors_classify_into_task_failures() {
        assert_eq!(
            DealScoutError::Network("timeout".into()).task_failure(),
            TaskFailure::Network
        );
        assert_eq!(
            DealScoutError::Llm("rate limited".into()).task_failure(),
            TaskFailure::Collaborator
        );
        assert_eq!(
            DealScoutError::parse("bad json").task_failure(),
            TaskFailure::Parse
        );
        assert_eq!(
            DealScoutError::Storage("disk full".into()).task_failure(),
            TaskFailure::Task
        );
    }
}
