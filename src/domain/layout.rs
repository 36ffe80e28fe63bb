use std::path::{Path, PathBuf};

/// Present in every WordPress Studio site (its SQLite database).
pub const MARKER_FILE: [&str; 3] = ["wp-content", "database", ".ht.sqlite"];
pub const SHIM_DIR: [&str; 2] = ["wp-content", "mu-plugins"];
pub const SHIM_FILE_NAME: &str = "wp-mail-logger.php";
pub const ENTRIES_DIR: [&str; 3] = ["wp-content", "uploads", "wp-mail-logs"];
pub const ENTRY_EXTENSION: &str = "json";

pub fn marker_path(root: &Path) -> PathBuf {
    join_all(root, &MARKER_FILE)
}

pub fn shim_dir(root: &Path) -> PathBuf {
    join_all(root, &SHIM_DIR)
}

pub fn shim_path(root: &Path) -> PathBuf {
    shim_dir(root).join(SHIM_FILE_NAME)
}

pub fn entries_dir(root: &Path) -> PathBuf {
    join_all(root, &ENTRIES_DIR)
}

pub fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION)
}

fn join_all(root: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(root.to_path_buf(), |acc, part| acc.join(part))
}
