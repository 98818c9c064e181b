//! Request validation against the command allow-list.

use crate::core::types::CommandRequest;
use crate::error::StationError;

/// Commands forwarded to the engine. Anything else is rejected.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "init", "plan", "apply", "destroy", "validate", "state", "output", "show", "version",
];

/// Commands that may write the engine's state file.
pub const MUTATING_COMMANDS: &[&str] = &["plan", "apply", "destroy", "state"];

pub fn is_allowed_command(command: &str) -> bool {
    ALLOWED_COMMANDS.contains(&command)
}

pub fn is_mutating_command(command: &str) -> bool {
    MUTATING_COMMANDS.contains(&command)
}

pub fn validate_request(request: &CommandRequest) -> Result<(), StationError> {
    let command = request.command.as_str();
    if command.trim().is_empty() {
        return Err(StationError::InvalidInput(
            "command cannot be empty".to_string(),
        ));
    }
    if !is_allowed_command(command) {
        return Err(StationError::InvalidInput(format!(
            "unsupported engine command `{command}`"
        )));
    }
    for key in request.variables.keys() {
        if key.trim().is_empty() {
            return Err(StationError::InvalidInput(
                "variable name cannot be empty".to_string(),
            ));
        }
        if key.contains('=') {
            return Err(StationError::InvalidInput(format!(
                "variable name `{key}` must not contain `=`"
            )));
        }
    }
    Ok(())
}
