//! Running child processes under a deadline with merged, bounded output.

use std::io::{self, Read};
use std::mem;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::cancel::{CancelToken, ExecContext};

/// How often the wait loop checks the cancel token.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to keep reading after the child is gone before giving up on the pipe.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    /// Killed at the effective deadline, which was this long after the start.
    TimedOut(Duration),
    Cancelled,
}

/// Captured output of a finished (or killed) child.
#[derive(Debug)]
pub struct MergedOutput {
    /// stdout and stderr interleaved in the order the child wrote them.
    pub output: Vec<u8>,
    pub truncated: usize,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl MergedOutput {
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(status) => status.code(),
            Termination::TimedOut(_) | Termination::Cancelled => None,
        }
    }

    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.output).into_owned();
        if self.truncated > 0 {
            text.push_str(&format!("\n[output truncated {} bytes]\n", self.truncated));
        }
        text
    }
}

/// Run `cmd` until it exits, the deadline passes, or `ctx` is cancelled.
///
/// stdout and stderr are attached to the same pipe. On unix the child leads its own
/// process group, and the whole group is killed before this returns on every path,
/// including errors, so processes it started do not outlive the call.
#[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64, output_limit_bytes = limits.output_limit_bytes))]
pub fn run_merged(mut cmd: Command, limits: &RunLimits, ctx: &ExecContext) -> Result<MergedOutput> {
    let start = Instant::now();
    let deadline = ctx.effective_deadline(start, limits.timeout);

    let (reader, writer) = io::pipe().context("create output pipe")?;
    let stderr_writer = writer.try_clone().context("clone output pipe")?;
    cmd.stdin(Stdio::null()).stdout(writer).stderr(stderr_writer);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let spawned = cmd.spawn();
    // The command still owns our copies of the write end; the reader sees EOF only
    // once they are closed.
    drop(cmd);
    let mut child = match spawned {
        Ok(child) => OwnedChild::new(child),
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let capture = Arc::new(Mutex::new(Capture::default()));
    let (done_tx, done_rx) = mpsc::channel();
    let reader_capture = Arc::clone(&capture);
    let limit = limits.output_limit_bytes;
    thread::spawn(move || {
        let result = read_stream_limited(reader, limit, &reader_capture);
        let _ = done_tx.send(result);
    });

    let termination = child.wait_until(start, deadline, &ctx.cancel)?;
    // Leftover background processes would hold the pipe open.
    child.kill_group();

    match done_rx.recv_timeout(DRAIN_GRACE) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(err = %e, "output reader failed"),
        Err(_) => warn!("output pipe still open after child exit; keeping captured output"),
    }
    let captured = {
        let mut guard = capture
            .lock()
            .map_err(|_| anyhow!("output buffer lock poisoned"))?;
        mem::take(&mut *guard)
    };

    if captured.truncated > 0 {
        warn!(truncated = captured.truncated, "output truncated");
    }

    let elapsed = start.elapsed();
    debug!(?termination, elapsed_ms = elapsed.as_millis() as u64, "command finished");
    Ok(MergedOutput {
        output: captured.bytes,
        truncated: captured.truncated,
        termination,
        elapsed,
    })
}

/// A spawned child that is killed and reaped on drop unless already waited on.
struct OwnedChild {
    child: Child,
    reaped: bool,
}

impl OwnedChild {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    /// Wait for exit, `deadline`, or cancellation. No deadline means wait until
    /// exit or cancellation.
    fn wait_until(
        &mut self,
        start: Instant,
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<Termination> {
        loop {
            if cancel.is_cancelled() {
                warn!("cancellation requested, killing command");
                self.kill_and_reap()?;
                return Ok(Termination::Cancelled);
            }
            let now = Instant::now();
            let slice = match deadline {
                Some(deadline) if now >= deadline => {
                    warn!("command timed out, killing");
                    self.kill_and_reap()?;
                    return Ok(Termination::TimedOut(deadline.duration_since(start)));
                }
                Some(deadline) => POLL_INTERVAL.min(deadline - now),
                None => POLL_INTERVAL,
            };
            if let Some(status) = self.child.wait_timeout(slice).context("wait for command")? {
                self.reaped = true;
                return Ok(Termination::Exited(status));
            }
        }
    }

    fn kill_and_reap(&mut self) -> Result<()> {
        self.kill_group();
        if let Err(e) = self.child.kill() {
            // Already gone after the group kill.
            debug!(err = %e, "direct kill failed");
        }
        self.child.wait().context("wait command after kill")?;
        self.reaped = true;
        Ok(())
    }

    /// SIGKILL every process still in the child's group.
    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Ok(pgid) = i32::try_from(self.child.id()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => warn!(err = %errno, pgid, "failed to kill process group"),
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for OwnedChild {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill_group();
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: usize,
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, capture: &Mutex<Capture>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut buf = capture
            .lock()
            .map_err(|_| anyhow!("output buffer lock poisoned"))?;
        let remaining = limit.saturating_sub(buf.bytes.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.bytes.extend_from_slice(&chunk[..keep]);
            buf.truncated += n.saturating_sub(keep);
        } else {
            buf.truncated += n;
        }
    }

    Ok(())
}
