//! Shared types for requests and outcomes.
//!
//! Requests are built once per invocation and never mutated afterwards.
//! Outcomes are created when the engine process terminates and are handed to
//! the caller by value.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// A single engine invocation request.
///
/// Variables live in a `BTreeMap` so iteration is always ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub variables: BTreeMap<String, String>,
    pub arguments: Vec<String>,
    pub plan_file: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn plan_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_file = Some(path.into());
        self
    }

    pub fn state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Copy of this request with the command replaced.
    pub fn with_command(&self, command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..self.clone()
        }
    }
}

/// Per-invocation phases, in order. Used for tracing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    LocatingBinary,
    Executing,
    Parsing,
    Completed,
}

/// Result of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub id: String,
    pub command: String,
    pub working_dir: PathBuf,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    /// `None` when the child was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub output: String,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Bytes of merged output dropped beyond the configured limit.
    pub truncated_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub id: String,
    pub plan_output: String,
    pub has_changes: bool,
    /// Best-effort count of diff-marker lines; see [`crate::core::classifier`].
    pub resource_count: usize,
    pub status: PlanStatus,
    /// Why the underlying run failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub id: String,
    pub apply_output: String,
    pub success: bool,
    pub resources_added: u32,
    pub resources_changed: u32,
    pub resources_destroyed: u32,
    /// Whether a `Resources:` summary line was found. When false the counts are zero
    /// because nothing could be parsed, not because nothing changed.
    pub summary_found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshotInfo {
    pub id: String,
    pub state_file: Option<PathBuf>,
    pub resource_count: usize,
    pub engine_version: String,
    pub last_updated: DateTime<Utc>,
}
