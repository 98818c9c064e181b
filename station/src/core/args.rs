//! Deterministic argument construction for engine invocations.

use crate::core::types::CommandRequest;

/// Build the engine argument list for `command`.
///
/// Order: command, `-chdir=`, `-var` pairs sorted by key, extra arguments verbatim,
/// plan file as a bare positional, `-state=`. Extra arguments are not escaped.
pub fn build_args(command: &str, request: &CommandRequest) -> Vec<String> {
    let mut args = Vec::with_capacity(
        1 + request.variables.len() * 2 + request.arguments.len() + 3,
    );
    args.push(command.to_string());

    if let Some(dir) = &request.working_dir {
        args.push(format!("-chdir={}", dir.display()));
    }

    for (key, value) in &request.variables {
        args.push("-var".to_string());
        args.push(format!("{key}={value}"));
    }

    args.extend(request.arguments.iter().cloned());

    if let Some(plan_file) = &request.plan_file {
        args.push(plan_file.display().to_string());
    }

    if let Some(state_file) = &request.state_file {
        args.push(format!("-state={}", state_file.display()));
    }

    args
}
