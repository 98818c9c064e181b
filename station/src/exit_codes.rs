//! Stable exit codes for station CLI commands.

use crate::error::ErrorKind;

/// Command ran and succeeded.
pub const OK: i32 = 0;
/// Invalid input, config, or directory; the engine was not run.
pub const INVALID: i32 = 1;
/// The engine ran and failed.
pub const FAILED: i32 = 2;
/// The engine run timed out or was cancelled.
pub const TIMEOUT: i32 = 3;

/// Exit code for a run that ended with `kind`.
pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Timeout | ErrorKind::Cancelled => TIMEOUT,
        ErrorKind::ExecutionFailed | ErrorKind::InvalidState => FAILED,
        ErrorKind::InvalidInput
        | ErrorKind::WorkingDir
        | ErrorKind::BinaryNotFound
        | ErrorKind::PermissionDenied => INVALID,
    }
}
