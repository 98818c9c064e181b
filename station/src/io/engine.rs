//! Engine abstraction for IaC binary invocation.
//!
//! The [`Engine`] trait decouples orchestration from the actual binary
//! (currently `tofu`). Tests use scripted engines that return predetermined
//! transcripts without spawning processes.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::StationError;
use crate::io::binary::locate_binary;
use crate::io::cancel::ExecContext;
use crate::io::process::{RunLimits, Termination, run_merged};

/// Parameters for a single engine run.
#[derive(Debug, Clone)]
pub struct EngineInvocation {
    /// Absolute binary path returned by [`Engine::locate`].
    pub binary: PathBuf,
    /// Validated working directory for the child process.
    pub workdir: PathBuf,
    /// Arguments from [`crate::core::args::build_args`].
    pub args: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Result of an engine run that was actually attempted.
///
/// `failure` and `output` are not mutually exclusive: a failed run keeps
/// whatever the child printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRun {
    pub output: String,
    pub exit_code: Option<i32>,
    pub truncated_bytes: usize,
    pub failure: Option<StationError>,
}

/// Abstraction over engine backends.
pub trait Engine: Send + Sync {
    /// Resolve the binary before anything is spawned. The returned path is what
    /// [`Engine::run`] receives in [`EngineInvocation::binary`].
    fn locate(&self) -> Result<PathBuf, StationError>;

    /// Run one invocation. `Err` means the command could not be attempted.
    fn run(&self, invocation: &EngineInvocation, ctx: &ExecContext)
    -> Result<EngineRun, StationError>;
}

/// Engine that spawns a configured binary (`tofu` by default).
#[derive(Debug, Clone)]
pub struct TofuEngine {
    binary: PathBuf,
}

impl TofuEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Engine for TofuEngine {
    fn locate(&self) -> Result<PathBuf, StationError> {
        locate_binary(&self.binary)
    }

    #[instrument(skip_all, fields(command = invocation.args.first().map(String::as_str).unwrap_or_default()))]
    fn run(
        &self,
        invocation: &EngineInvocation,
        ctx: &ExecContext,
    ) -> Result<EngineRun, StationError> {
        info!(workdir = %invocation.workdir.display(), binary = %invocation.binary.display(), "starting engine");

        let mut cmd = Command::new(&invocation.binary);
        cmd.args(&invocation.args).current_dir(&invocation.workdir);

        let limits = RunLimits {
            timeout: invocation.timeout,
            output_limit_bytes: invocation.output_limit_bytes,
        };
        let merged = run_merged(cmd, &limits, ctx).map_err(|err| spawn_error(&invocation.binary, &err))?;

        let failure = match merged.termination {
            Termination::Exited(status) if status.success() => None,
            Termination::Exited(status) => {
                warn!(exit_code = ?status.code(), "engine command failed");
                Some(StationError::ExecutionFailed(match status.code() {
                    Some(code) => format!("engine exited with status {code}"),
                    None => "engine terminated by signal".to_string(),
                }))
            }
            Termination::TimedOut(after) => {
                let timeout_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms, "engine command timed out");
                Some(StationError::Timeout { timeout_ms })
            }
            Termination::Cancelled => {
                warn!("engine command cancelled");
                Some(StationError::Cancelled)
            }
        };

        debug!(exit_code = ?merged.exit_code(), failed = failure.is_some(), "engine run finished");
        Ok(EngineRun {
            output: merged.text(),
            exit_code: merged.exit_code(),
            truncated_bytes: merged.truncated,
            failure,
        })
    }
}

fn spawn_error(binary: &Path, err: &anyhow::Error) -> StationError {
    let io_kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .map(io::Error::kind);
    match io_kind {
        Some(io::ErrorKind::NotFound) => {
            StationError::binary_not_found(binary.display(), "engine binary disappeared")
        }
        Some(io::ErrorKind::PermissionDenied) => StationError::PermissionDenied(format!(
            "cannot execute {}: {err:#}",
            binary.display()
        )),
        _ => StationError::ExecutionFailed(format!("{err:#}")),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::write_script;

    fn invocation(binary: &Path, workdir: &Path, args: &[&str], timeout_ms: u64) -> EngineInvocation {
        EngineInvocation {
            binary: binary.to_path_buf(),
            workdir: workdir.to_path_buf(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            timeout: Duration::from_millis(timeout_ms),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn successful_run_has_no_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let binary = write_script(temp.path(), "tofu", "echo \"ran $1 in $(basename \"$PWD\")\"\n")
            .expect("script");
        let work = temp.path().join("work");
        std::fs::create_dir(&work).expect("mkdir");

        let run = TofuEngine::new(&binary)
            .run(&invocation(&binary, &work, &["plan"], 10_000), &ExecContext::new())
            .expect("run");

        assert_eq!(run.output, "ran plan in work\n");
        assert_eq!(run.exit_code, Some(0));
        assert!(run.failure.is_none());
    }

    #[test]
    fn nonzero_exit_is_execution_failed_with_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let binary = write_script(temp.path(), "tofu", "echo 'Error: bad config' >&2\nexit 1\n")
            .expect("script");

        let run = TofuEngine::new(&binary)
            .run(&invocation(&binary, temp.path(), &["validate"], 10_000), &ExecContext::new())
            .expect("run");

        assert_eq!(run.exit_code, Some(1));
        assert_eq!(run.output, "Error: bad config\n");
        assert_eq!(
            run.failure.as_ref().map(StationError::kind),
            Some(ErrorKind::ExecutionFailed)
        );
    }

    #[test]
    fn slow_run_is_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let binary = write_script(temp.path(), "tofu", "exec sleep 30\n").expect("script");

        let run = TofuEngine::new(&binary)
            .run(&invocation(&binary, temp.path(), &["apply"], 200), &ExecContext::new())
            .expect("run");

        assert_eq!(run.exit_code, None);
        assert_eq!(run.failure, Some(StationError::Timeout { timeout_ms: 200 }));
    }

    #[test]
    fn vanished_binary_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let binary = temp.path().join("gone");
        let err = TofuEngine::new(&binary)
            .run(&invocation(&binary, temp.path(), &["plan"], 1_000), &ExecContext::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BinaryNotFound);
    }
}
