//! Classified errors surfaced by the orchestrator.
//!
//! Validation and lookup failures are returned before any process is spawned.
//! Execution failures (`ExecutionFailed`, `Timeout`, `Cancelled`) are usually
//! captured into a [`CommandOutcome`](crate::core::types::CommandOutcome)
//! instead of being returned.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("working directory error: {message} ({path})")]
    WorkingDir { path: String, message: String },
    #[error("engine binary not found: {message} ({path})")]
    BinaryNotFound { path: String, message: String },
    #[error("engine command failed: {0}")]
    ExecutionFailed(String),
    #[error("engine command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("engine command cancelled")]
    Cancelled,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl StationError {
    pub fn working_dir(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::WorkingDir {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn binary_not_found(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::BinaryNotFound {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::WorkingDir { .. } => ErrorKind::WorkingDir,
            Self::BinaryNotFound { .. } => ErrorKind::BinaryNotFound,
            Self::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
        }
    }
}

/// Stable error codes recorded in outcomes and persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    #[serde(rename = "WORKING_DIR_ERROR")]
    WorkingDir,
    #[serde(rename = "ENGINE_NOT_FOUND")]
    BinaryNotFound,
    ExecutionFailed,
    Timeout,
    Cancelled,
    InvalidState,
    PermissionDenied,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::WorkingDir => "WORKING_DIR_ERROR",
            Self::BinaryNotFound => "ENGINE_NOT_FOUND",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::InvalidState => "INVALID_STATE",
            Self::PermissionDenied => "PERMISSION_DENIED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
