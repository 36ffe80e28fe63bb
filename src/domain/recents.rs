use std::path::{Path, PathBuf};

pub const MAX_RECENT_DIRECTORIES: usize = 5;

/// Most-recent-first list of selected installation paths, deduplicated by
/// `Path` equality (component-wise, case-sensitive) and capped at [`MAX_RECENT_DIRECTORIES`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecentDirectories {
    directories: Vec<PathBuf>,
}

impl RecentDirectories {
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        let mut recents = Self::default();
        for path in paths.into_iter().rev() {
            recents.add(&path);
        }
        recents
    }

    pub fn add(&mut self, path: &Path) {
        self.directories.retain(|existing| existing != path);
        self.directories.insert(0, path.to_path_buf());
        self.directories.truncate(MAX_RECENT_DIRECTORIES);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.directories
    }

    /// 1-based, matching what `recents` prints.
    pub fn nth(&self, position: usize) -> Option<&Path> {
        position
            .checked_sub(1)
            .and_then(|idx| self.directories.get(idx))
            .map(PathBuf::as_path)
    }
}
