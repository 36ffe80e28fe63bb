use crate::domain::{marker_path, shim_dir, shim_path};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

pub const SHIM_SOURCE: &str = include_str!("wp-mail-logger.php");

/// True when `root` carries the installation marker. Any I/O error reads as
/// "not an installation".
pub fn is_installation_dir(root: &Path) -> bool {
    match fs::metadata(marker_path(root)) {
        Ok(_) => true,
        Err(error) => {
            tracing::debug!(root = %root.display(), %error, "installation marker not accessible");
            false
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallShimError {
    #[error("failed to create {path}: {source}")]
    CreateDir { path: String, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: String, source: io::Error },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallOutcome {
    Installed,
    AlreadyPresent,
}

/// Writes the logging shim unless a file of that name already exists. An
/// existing file is never touched, whatever its content.
pub fn install_shim(root: &Path) -> Result<InstallOutcome, InstallShimError> {
    let dir = shim_dir(root);
    fs::create_dir_all(&dir).map_err(|source| InstallShimError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let path = shim_path(root);
    let write_error = |source: io::Error| InstallShimError::Write {
        path: path.display().to_string(),
        source,
    };

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
            return Ok(InstallOutcome::AlreadyPresent);
        }
        Err(error) => return Err(write_error(error)),
    };

    if let Err(error) = file.write_all(SHIM_SOURCE.as_bytes()) {
        drop(file);
        let _ = fs::remove_file(&path);
        return Err(write_error(error));
    }

    tracing::info!(path = %path.display(), "installed mail logger shim");
    Ok(InstallOutcome::Installed)
}

#[derive(Debug, Error)]
pub enum UninstallShimError {
    #[error("failed to remove {path}: {source}")]
    Remove { path: String, source: io::Error },
}

pub fn uninstall_shim(root: &Path) -> Result<(), UninstallShimError> {
    let path = shim_path(root);
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "removed mail logger shim");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UninstallShimError::Remove {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_installation(root: &Path) {
        let marker = marker_path(root);
        fs::create_dir_all(marker.parent().expect("parent")).expect("mkdir");
        fs::write(marker, b"").expect("marker");
    }

    #[test]
    fn recognizes_directory_with_marker() {
        let dir = tempdir().expect("tempdir");
        make_installation(dir.path());
        assert!(is_installation_dir(dir.path()));
    }

    #[test]
    fn rejects_directory_without_marker() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("wp-content")).expect("mkdir");
        assert!(!is_installation_dir(dir.path()));
        assert!(!is_installation_dir(&dir.path().join("missing")));
    }

    #[test]
    fn rejects_file_path() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").expect("write");
        assert!(!is_installation_dir(&file));
    }

    #[test]
    fn install_creates_parent_dirs_and_writes_shim() {
        let dir = tempdir().expect("tempdir");
        let outcome = install_shim(dir.path()).expect("install");
        assert_eq!(outcome, InstallOutcome::Installed);

        let written = fs::read_to_string(shim_path(dir.path())).expect("read");
        assert_eq!(written, SHIM_SOURCE);
    }

    #[test]
    fn install_twice_leaves_content_unchanged() {
        let dir = tempdir().expect("tempdir");
        install_shim(dir.path()).expect("first");
        let first = fs::read(shim_path(dir.path())).expect("read");

        let outcome = install_shim(dir.path()).expect("second");
        assert_eq!(outcome, InstallOutcome::AlreadyPresent);
        assert_eq!(fs::read(shim_path(dir.path())).expect("read"), first);
    }

    #[test]
    fn install_preserves_user_edits() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(shim_dir(dir.path())).expect("mkdir");
        fs::write(shim_path(dir.path()), "<?php // edited").expect("write");

        install_shim(dir.path()).expect("install");
        assert_eq!(
            fs::read_to_string(shim_path(dir.path())).expect("read"),
            "<?php // edited"
        );
    }

    #[test]
    fn install_fails_when_shim_dir_is_blocked_by_a_file() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("wp-content")).expect("mkdir");
        fs::write(shim_dir(dir.path()), b"not a dir").expect("write");

        let error = install_shim(dir.path()).expect_err("blocked");
        assert!(matches!(error, InstallShimError::CreateDir { .. }));
    }

    #[test]
    fn uninstall_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        install_shim(dir.path()).expect("install");

        uninstall_shim(dir.path()).expect("first");
        assert!(!shim_path(dir.path()).exists());
        uninstall_shim(dir.path()).expect("second");
    }

    #[test]
    fn shim_writes_entries_where_the_store_reads_them() {
        assert!(SHIM_SOURCE.contains("/wp-mail-logs"));
        assert!(SHIM_SOURCE.contains("'timestamp_unix' => time()"));
        assert!(SHIM_SOURCE.contains("'.json'"));
    }
}
