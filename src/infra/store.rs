use crate::domain::{Entry, ParseEntryError, entries_dir, is_entry_file, parse_entry, sort_newest_first};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

// The shim is the only writer of entry files; this module only reads and
// deletes them, so no locking is attempted.

#[derive(Debug, Error)]
pub enum ListEntriesError {
    #[error("failed to read entries directory {path}: {source}")]
    ReadDir { path: String, source: walkdir::Error },
}

#[derive(Debug, Error)]
enum ReadEntryError {
    #[error("failed to read file: {0}")]
    Read(#[from] io::Error),

    #[error(transparent)]
    Parse(#[from] ParseEntryError),
}

/// Loads every entry under the installation, newest first.
///
/// A missing entries directory is an empty log. A file that cannot be read or
/// parsed is logged and skipped; the rest of the scan carries on.
pub fn list_entries(root: &Path) -> Result<Vec<Entry>, ListEntriesError> {
    let dir = entries_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for path in entry_files(&dir)? {
        match read_entry(&path) {
            Ok(entry) => entries.push(entry),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping unreadable entry");
            }
        }
    }

    sort_newest_first(&mut entries);
    Ok(entries)
}

fn read_entry(path: &Path) -> Result<Entry, ReadEntryError> {
    let raw = fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    Ok(parse_entry(&raw, stem)?)
}

/// Entry files in file-name order. Per-item walk errors (e.g. a file vanishing
/// mid-scan) are skipped; failing to open the directory itself is an error.
fn entry_files(dir: &Path) -> Result<Vec<PathBuf>, ListEntriesError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    for item in walker {
        let item = match item {
            Ok(item) => item,
            Err(error) if error.depth() == 0 => {
                return Err(ListEntriesError::ReadDir {
                    path: dir.display().to_string(),
                    source: error,
                });
            }
            Err(error) => {
                tracing::warn!(dir = %dir.display(), %error, "skipping entry during scan");
                continue;
            }
        };
        if item.file_type().is_file() && is_entry_file(item.path()) {
            files.push(item.into_path());
        }
    }
    Ok(files)
}

#[derive(Debug, Error)]
pub enum DeleteEntryError {
    #[error("invalid entry id: {0:?}")]
    InvalidId(String),

    #[error("failed to delete {path}: {source}")]
    Remove { path: String, source: io::Error },
}

/// Removes `<id>.json`. Deleting an id that is already gone succeeds.
pub fn delete_entry(root: &Path, id: &str) -> Result<(), DeleteEntryError> {
    if !is_safe_entry_id(id) {
        return Err(DeleteEntryError::InvalidId(id.to_string()));
    }

    let path = entries_dir(root).join(format!("{id}.json"));
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DeleteEntryError::Remove {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn is_safe_entry_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && !id.contains("..")
        && !id.contains(['/', '\\'])
        && !id.contains('\0')
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClearOutcome {
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum ClearEntriesError {
    #[error(transparent)]
    List(#[from] ListEntriesError),
}

/// Best effort: each file is removed independently and failures are counted,
/// not propagated. Only failing to enumerate the directory is an error.
pub fn clear_entries(root: &Path) -> Result<ClearOutcome, ClearEntriesError> {
    let dir = entries_dir(root);
    if !dir.is_dir() {
        return Ok(ClearOutcome::default());
    }

    Ok(remove_entry_files(entry_files(&dir)?))
}

fn remove_entry_files(paths: Vec<PathBuf>) -> ClearOutcome {
    let mut outcome = ClearOutcome::default();
    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => outcome.deleted += 1,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to delete entry");
                outcome.failed += 1;
            }
        }
    }
    outcome
}
