//! Test-only helpers: fake engine scripts and a scripted in-memory engine.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use crate::error::StationError;
use crate::io::cancel::ExecContext;
use crate::io::engine::{Engine, EngineInvocation, EngineRun};

/// Write an executable `/bin/sh` script named `name` under `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}"))
        .with_context(|| format!("write script {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod script {}", path.display()))?;
    Ok(path)
}

/// Write a fake engine that prints `output` and exits with `exit_code`.
#[cfg(unix)]
pub fn write_fake_engine(dir: &Path, output: &str, exit_code: i32) -> Result<PathBuf> {
    let transcript = dir.join("transcript.txt");
    fs::write(&transcript, output)
        .with_context(|| format!("write transcript {}", transcript.display()))?;
    write_script(
        dir,
        "tofu",
        &format!("cat '{}'\nexit {exit_code}\n", transcript.display()),
    )
}

/// One queued response for [`ScriptedEngine`].
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub output: String,
    pub exit_code: Option<i32>,
    pub failure: Option<StationError>,
}

impl ScriptedRun {
    pub fn ok(output: &str) -> Self {
        Self {
            output: output.to_string(),
            exit_code: Some(0),
            failure: None,
        }
    }

    pub fn failed(output: &str, exit_code: i32) -> Self {
        Self {
            output: output.to_string(),
            exit_code: Some(exit_code),
            failure: Some(StationError::ExecutionFailed(format!(
                "engine exited with status {exit_code}"
            ))),
        }
    }

    pub fn timed_out(output: &str) -> Self {
        Self {
            output: output.to_string(),
            exit_code: None,
            failure: Some(StationError::Timeout { timeout_ms: 0 }),
        }
    }
}

/// Engine that replays queued runs and records the invocations it saw.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    runs: Mutex<VecDeque<ScriptedRun>>,
    seen: Mutex<Vec<EngineInvocation>>,
    missing: bool,
}

impl ScriptedEngine {
    /// Path reported by [`Engine::locate`].
    pub const RESOLVED_BINARY: &'static str = "/opt/scripted/tofu";

    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            seen: Mutex::new(Vec::new()),
            missing: false,
        }
    }

    /// Engine whose binary lookup always fails.
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn invocations(&self) -> Vec<EngineInvocation> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    fn next_run(&self) -> Result<ScriptedRun> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| anyhow!("scripted runs poisoned"))?;
        runs.pop_front()
            .ok_or_else(|| anyhow!("scripted engine has no remaining runs"))
    }
}

impl Engine for ScriptedEngine {
    fn locate(&self) -> Result<PathBuf, StationError> {
        if self.missing {
            return Err(StationError::binary_not_found(
                "scripted",
                "engine binary not found",
            ));
        }
        Ok(PathBuf::from(Self::RESOLVED_BINARY))
    }

    fn run(
        &self,
        invocation: &EngineInvocation,
        _ctx: &ExecContext,
    ) -> Result<EngineRun, StationError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(invocation.clone());
        }
        let run = self
            .next_run()
            .map_err(|err| StationError::ExecutionFailed(err.to_string()))?;
        Ok(EngineRun {
            output: run.output,
            exit_code: run.exit_code,
            truncated_bytes: 0,
            failure: run.failure,
        })
    }
}
