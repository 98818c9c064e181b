//! Engine binary lookup.
//!
//! Turns a would-be spawn failure into a specific error before any process starts.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StationError;

/// Resolve the configured engine binary to an absolute executable path.
///
/// Values containing a path separator are checked relative to this process's
/// current directory; bare names are searched on `PATH`. The result is absolute
/// so a child started in another directory runs the same file.
pub fn locate_binary(configured: &Path) -> Result<PathBuf, StationError> {
    if configured.as_os_str().is_empty() {
        return Err(StationError::binary_not_found(
            "",
            "engine binary path is not set",
        ));
    }

    if configured.components().count() > 1 || configured.is_absolute() {
        check_executable(configured)?;
        return absolutize(configured);
    }

    let path_var = env::var_os("PATH").unwrap_or_default();
    let found = search_path(configured.as_os_str(), &path_var).ok_or_else(|| {
        StationError::binary_not_found(
            configured.display(),
            "engine binary not found on PATH",
        )
    })?;
    let found = absolutize(&found)?;
    debug!(resolved = %found.display(), "engine binary resolved");
    Ok(found)
}

fn absolutize(path: &Path) -> Result<PathBuf, StationError> {
    std::path::absolute(path).map_err(|e| {
        StationError::binary_not_found(path.display(), format!("cannot resolve path: {e}"))
    })
}

fn search_path(name: &OsStr, path_var: &OsStr) -> Option<PathBuf> {
    env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir, name))
        .find(|candidate| check_executable(candidate).is_ok())
}

fn candidates(dir: &Path, name: &OsStr) -> Vec<PathBuf> {
    let plain = dir.join(name);
    if env::consts::EXE_SUFFIX.is_empty() {
        return vec![plain];
    }
    let mut suffixed = plain.clone().into_os_string();
    suffixed.push(env::consts::EXE_SUFFIX);
    vec![plain, PathBuf::from(suffixed)]
}

fn check_executable(path: &Path) -> Result<(), StationError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(StationError::PermissionDenied(format!(
                "cannot access engine binary {}: {e}",
                path.display()
            )));
        }
        Err(_) => {
            return Err(StationError::binary_not_found(
                path.display(),
                "engine binary not found",
            ));
        }
    };

    if !metadata.is_file() {
        return Err(StationError::binary_not_found(
            path.display(),
            "engine binary is not a file",
        ));
    }
    if !is_executable(&metadata) {
        return Err(StationError::binary_not_found(
            path.display(),
            "engine binary is not executable",
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_path_is_not_found() {
        let err = locate_binary(Path::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BinaryNotFound);
    }

    #[test]
    fn missing_explicit_path_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = locate_binary(&temp.path().join("tofu")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BinaryNotFound);
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn directory_is_not_a_binary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = locate_binary(temp.path()).unwrap_err();
        assert!(err.to_string().contains("not a file"));
    }

    #[test]
    fn unknown_bare_name_is_not_found() {
        let err = locate_binary(Path::new("tofu-binary-that-does-not-exist-42")).unwrap_err();
        assert!(err.to_string().contains("not found on PATH"));
    }

    #[test]
    fn search_path_skips_non_matching_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let empty = tempfile::tempdir().expect("tempdir");
        let path_var = env::join_paths([empty.path(), temp.path()]).expect("join paths");
        assert_eq!(search_path(OsStr::new("tofu"), &path_var), None);
    }

    #[cfg(unix)]
    #[test]
    fn executable_script_is_located() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("tofu");
        fs::write(&script, "#!/bin/sh\nexit 0\n").expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");

        assert_eq!(locate_binary(&script).expect("locate"), script);

        let path_var = env::join_paths([temp.path()]).expect("join paths");
        assert_eq!(search_path(OsStr::new("tofu"), &path_var), Some(script));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("tofu");
        fs::write(&script, "#!/bin/sh\n").expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).expect("chmod");

        let err = locate_binary(&script).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BinaryNotFound);
        assert!(err.to_string().contains("not executable"));
    }

    #[cfg(unix)]
    #[test]
    fn bare_shell_resolves_on_path() {
        let resolved = locate_binary(Path::new("sh")).expect("sh on PATH");
        assert!(resolved.is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn relative_path_resolves_against_current_dir() {
        use std::os::unix::fs::PermissionsExt;

        let cwd = env::current_dir().expect("cwd");
        let temp = tempfile::tempdir_in(&cwd).expect("tempdir");
        let script = temp.path().join("tofu");
        fs::write(&script, "#!/bin/sh\nexit 0\n").expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        let relative = script.strip_prefix(&cwd).expect("relative path");
        assert!(relative.is_relative());

        let resolved = locate_binary(relative).expect("locate");
        assert!(resolved.is_absolute());
        assert_eq!(resolved, cwd.join(relative));
    }
}
