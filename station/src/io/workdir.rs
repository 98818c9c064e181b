//! Working directory checks performed before every engine launch.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::StationError;

pub fn validate_working_dir(dir: &Path) -> Result<(), StationError> {
    if dir.as_os_str().is_empty() {
        return Err(StationError::working_dir(
            "",
            "working directory cannot be empty",
        ));
    }

    let metadata = match fs::metadata(dir) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StationError::working_dir(
                dir.display(),
                "working directory does not exist",
            ));
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(StationError::PermissionDenied(format!(
                "cannot access working directory {}: {e}",
                dir.display()
            )));
        }
        Err(e) => {
            return Err(StationError::working_dir(
                dir.display(),
                format!("cannot access working directory: {e}"),
            ));
        }
    };

    if !metadata.is_dir() {
        return Err(StationError::working_dir(
            dir.display(),
            "path is not a directory",
        ));
    }
    Ok(())
}
