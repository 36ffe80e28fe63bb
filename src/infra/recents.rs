use crate::domain::RecentDirectories;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveStateDirError {
    #[error("home directory not found")]
    HomeDirNotFound,
}

pub fn resolve_state_dir() -> Result<PathBuf, ResolveStateDirError> {
    if let Some(override_dir) = std::env::var_os("WPMAIL_STATE_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let Some(home) = dirs::home_dir() else {
        return Err(ResolveStateDirError::HomeDirNotFound);
    };
    Ok(home.join(".wpmail"))
}

#[derive(Debug, Error)]
pub enum LoadRecentsError {
    #[error("failed to read recent directories: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse recent directories: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SaveRecentsError {
    #[error("failed to encode recent directories: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write recent directories: {0}")]
    Write(#[from] io::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RecentsFile {
    version: u32,
    directories: Vec<PathBuf>,
}

fn recents_path(state_dir: &Path) -> PathBuf {
    state_dir.join("recent_directories.json")
}

pub fn load_recents(state_dir: &Path) -> Result<RecentDirectories, LoadRecentsError> {
    let path = recents_path(state_dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(RecentDirectories::default());
        }
        Err(error) => return Err(error.into()),
    };

    let file: RecentsFile = serde_json::from_str(&raw)?;
    Ok(RecentDirectories::from_paths(file.directories))
}

pub fn save_recents(state_dir: &Path, recents: &RecentDirectories) -> Result<(), SaveRecentsError> {
    fs::create_dir_all(state_dir)?;

    let path = recents_path(state_dir);
    let tmp = path.with_extension("json.tmp");
    let file = RecentsFile {
        version: 1,
        directories: recents.paths().to_vec(),
    };
    let text = serde_json::to_string_pretty(&file)?;
    fs::write(&tmp, text)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Persisted recents list. Loaded once on open; every `add` is flushed to disk
/// before it returns.
#[derive(Debug)]
pub struct RecentsRegistry {
    state_dir: PathBuf,
    recents: RecentDirectories,
}

impl RecentsRegistry {
    /// Opens the registry under `state_dir`. An unreadable or corrupt file
    /// starts an empty list; the next `add` replaces it.
    pub fn open(state_dir: PathBuf) -> Self {
        let recents = match load_recents(&state_dir) {
            Ok(recents) => recents,
            Err(error) => {
                tracing::warn!(state_dir = %state_dir.display(), %error, "starting with empty recent directories");
                RecentDirectories::default()
            }
        };
        Self { state_dir, recents }
    }

    pub fn add(&mut self, path: &Path) -> Result<&[PathBuf], SaveRecentsError> {
        let mut next = self.recents.clone();
        next.add(path);
        save_recents(&self.state_dir, &next)?;
        self.recents = next;
        Ok(self.recents.paths())
    }

    pub fn get(&self) -> &RecentDirectories {
        &self.recents
    }
}
