use crate::domain::{Entry, WatchTiming};
use crate::infra::{
    ClearEntriesError, ClearOutcome, DeleteEntryError, DirectoryWatcher, InstallShimError,
    ListEntriesError, NotificationChannel, RecentsRegistry, SaveRecentsError, Subscriber,
    UninstallShimError, clear_entries, delete_entry, install_shim, is_installation_dir,
    list_entries, uninstall_shim,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Selection {
    pub root: PathBuf,
    pub entries: Vec<Entry>,
    pub recents: Vec<PathBuf>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecentRef {
    /// 1-based position in the recents list.
    Position(usize),
    Path(PathBuf),
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error(
        "not a WordPress Studio site: {0}\nHint: select a directory that contains wp-content/database/.ht.sqlite"
    )]
    InvalidDirectory(String),

    #[error("failed to install the mail logger plugin: {0}\nHint: check permissions on wp-content/mu-plugins.")]
    InstallFailed(#[source] InstallShimError),

    #[error("no recent directory at position {0}\nHint: run `wpmail recents` to list them.")]
    UnknownRecent(usize),

    #[error(transparent)]
    SaveRecents(#[from] SaveRecentsError),
}

/// Everything a shell needs to drive the mail log: the recents registry, the
/// single watch session, the teardown flag and the subscriber slot.
///
/// Each instance is independent, so tests can run several side by side.
#[derive(Debug)]
pub struct Core {
    registry: RecentsRegistry,
    suppressed: Arc<AtomicBool>,
    notifications: NotificationChannel,
    watcher: DirectoryWatcher,
}

impl Core {
    pub fn open(state_dir: PathBuf, timing: WatchTiming) -> Self {
        let suppressed = Arc::new(AtomicBool::new(false));
        let notifications = NotificationChannel::default();
        let watcher =
            DirectoryWatcher::new(timing, Arc::clone(&suppressed), notifications.clone());
        Self {
            registry: RecentsRegistry::open(state_dir),
            suppressed,
            notifications,
            watcher,
        }
    }

    pub fn select_directory(&mut self, root: &Path) -> Result<Selection, SelectError> {
        if !is_installation_dir(root) {
            return Err(SelectError::InvalidDirectory(root.display().to_string()));
        }

        let installed = install_shim(root).map_err(|error| {
            tracing::warn!(root = %root.display(), %error, "shim install failed");
            SelectError::InstallFailed(error)
        })?;
        tracing::debug!(root = %root.display(), ?installed, "shim ready");

        let recents = self.registry.add(root)?.to_vec();

        // A new session re-enables publishing after an earlier shutdown.
        self.suppressed.store(false, Ordering::SeqCst);
        if let Err(error) = self.watcher.start(root) {
            tracing::warn!(root = %root.display(), %error, "live updates disabled");
        }

        let entries = list_entries(root).unwrap_or_else(|error| {
            tracing::warn!(root = %root.display(), %error, "initial scan failed");
            Vec::new()
        });
        Ok(Selection {
            root: root.to_path_buf(),
            entries,
            recents,
        })
    }

    /// Same flow as [`Core::select_directory`]; the path is revalidated, never
    /// trusted because it was valid last time.
    pub fn select_recent(&mut self, recent: RecentRef) -> Result<Selection, SelectError> {
        let root = match recent {
            RecentRef::Path(path) => path,
            RecentRef::Position(position) => self
                .registry
                .get()
                .nth(position)
                .map(Path::to_path_buf)
                .ok_or(SelectError::UnknownRecent(position))?,
        };
        self.select_directory(&root)
    }

    pub fn list_entries(&self, root: &Path) -> Result<Vec<Entry>, ListEntriesError> {
        list_entries(root)
    }

    pub fn delete_entry(&self, root: &Path, id: &str) -> Result<(), DeleteEntryError> {
        delete_entry(root, id)
    }

    pub fn clear_all(&self, root: &Path) -> Result<ClearOutcome, ClearEntriesError> {
        clear_entries(root)
    }

    pub fn uninstall_shim(&self, root: &Path) -> Result<(), UninstallShimError> {
        uninstall_shim(root)
    }

    pub fn recents(&self) -> &[PathBuf] {
        self.registry.get().paths()
    }

    /// Registers the sole subscriber, replacing any earlier one.
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.notifications.subscribe(subscriber);
    }

    pub fn unsubscribe(&self) {
        self.notifications.unsubscribe();
    }

    pub fn watched_root(&self) -> Option<&Path> {
        self.watcher.watched_root()
    }

    /// Suppress first, then stop: a trigger that fires mid-teardown must not
    /// reach a subscriber that is going away.
    pub fn shutdown(&mut self) {
        self.suppressed.store(true, Ordering::SeqCst);
        self.watcher.stop();
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{entries_dir, marker_path, shim_dir, shim_path};
    use std::fs;
    use std::sync::mpsc::channel;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    const FAST: WatchTiming = WatchTiming {
        stability: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
    };

    fn site() -> TempDir {
        let dir = tempdir().expect("tempdir");
        let marker = marker_path(dir.path());
        fs::create_dir_all(marker.parent().expect("parent")).expect("mkdir");
        fs::write(marker, b"").expect("marker");
        dir
    }

    fn write_entry(root: &Path, id: &str, ts: i64) {
        fs::create_dir_all(entries_dir(root)).expect("mkdir");
        let body = serde_json::json!({ "id": id, "subject": "hi", "timestamp_unix": ts });
        fs::write(
            entries_dir(root).join(format!("{id}.json")),
            serde_json::to_string(&body).expect("encode"),
        )
        .expect("write");
    }

    #[test]
    fn invalid_directory_has_no_side_effects() {
        let state = tempdir().expect("state");
        let plain = tempdir().expect("plain");
        let mut core = Core::open(state.path().to_path_buf(), FAST);

        let error = core.select_directory(plain.path()).expect_err("invalid");
        assert!(matches!(error, SelectError::InvalidDirectory(_)));
        assert!(core.recents().is_empty());
        assert!(core.watched_root().is_none());
        assert!(!shim_path(plain.path()).exists());
    }

    #[test]
    fn selection_installs_records_watches_and_lists() {
        let state = tempdir().expect("state");
        let site = site();
        write_entry(site.path(), "email_1", 100);
        write_entry(site.path(), "email_2", 300);
        write_entry(site.path(), "email_3", 200);
        let mut core = Core::open(state.path().to_path_buf(), FAST);

        let selection = core.select_directory(site.path()).expect("select");
        let stamps: Vec<Option<i64>> = selection
            .entries
            .iter()
            .map(|e| e.timestamp_unix)
            .collect();
        assert_eq!(stamps, vec![Some(300), Some(200), Some(100)]);
        assert_eq!(selection.recents, vec![site.path().to_path_buf()]);
        assert!(shim_path(site.path()).is_file());
        assert_eq!(core.watched_root(), Some(site.path()));
    }

    #[test]
    fn install_failure_aborts_before_registry_and_watch() {
        let state = tempdir().expect("state");
        let site = site();
        fs::write(shim_dir(site.path()), b"blocking file").expect("write");
        let mut core = Core::open(state.path().to_path_buf(), FAST);

        let error = core.select_directory(site.path()).expect_err("install");
        assert!(matches!(error, SelectError::InstallFailed(_)));
        assert!(core.recents().is_empty());
        assert!(core.watched_root().is_none());
    }

    #[test]
    fn reselecting_moves_path_to_front_and_switches_watch() {
        let state = tempdir().expect("state");
        let (a, b) = (site(), site());
        let mut core = Core::open(state.path().to_path_buf(), FAST);

        core.select_directory(a.path()).expect("a");
        core.select_directory(b.path()).expect("b");
        assert_eq!(core.watched_root(), Some(b.path()));

        let selection = core.select_recent(RecentRef::Position(2)).expect("recent");
        assert_eq!(selection.root, a.path());
        assert_eq!(
            selection.recents,
            vec![a.path().to_path_buf(), b.path().to_path_buf()]
        );
        assert_eq!(core.watched_root(), Some(a.path()));
    }

    #[test]
    fn recent_that_is_no_longer_valid_is_rejected() {
        let state = tempdir().expect("state");
        let site = site();
        let mut core = Core::open(state.path().to_path_buf(), FAST);
        core.select_directory(site.path()).expect("select");

        fs::remove_file(marker_path(site.path())).expect("remove marker");
        let error = core
            .select_recent(RecentRef::Path(site.path().to_path_buf()))
            .expect_err("stale");
        assert!(matches!(error, SelectError::InvalidDirectory(_)));

        let error = core.select_recent(RecentRef::Position(4)).expect_err("range");
        assert!(matches!(error, SelectError::UnknownRecent(4)));
    }

    #[test]
    fn recents_survive_reopen() {
        let state = tempdir().expect("state");
        let site = site();
        {
            let mut core = Core::open(state.path().to_path_buf(), FAST);
            core.select_directory(site.path()).expect("select");
        }
        let core = Core::open(state.path().to_path_buf(), FAST);
        assert_eq!(core.recents(), &[site.path().to_path_buf()]);
    }

    #[test]
    fn delete_and_clear_through_the_core() {
        let state = tempdir().expect("state");
        let site = site();
        write_entry(site.path(), "email_1", 1);
        write_entry(site.path(), "email_2", 2);
        let core = Core::open(state.path().to_path_buf(), FAST);

        core.delete_entry(site.path(), "email_1").expect("delete");
        core.delete_entry(site.path(), "email_1").expect("delete again");
        let ids: Vec<String> = core
            .list_entries(site.path())
            .expect("list")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["email_2".to_string()]);

        core.clear_all(site.path()).expect("clear");
        assert!(core.list_entries(site.path()).expect("list").is_empty());
    }

    #[test]
    fn subscriber_receives_snapshot_after_new_entry() {
        let state = tempdir().expect("state");
        let site = site();
        let mut core = Core::open(state.path().to_path_buf(), FAST);
        let (tx, rx) = channel::<Vec<Entry>>();
        core.subscribe(Box::new(move |entries: &[Entry]| {
            let _ = tx.send(entries.to_vec());
        }));

        core.select_directory(site.path()).expect("select");
        write_entry(site.path(), "email_new", 42);

        let snapshot = rx.recv_timeout(Duration::from_secs(5)).expect("snapshot");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "email_new");
    }

    #[test]
    fn shutdown_suppresses_then_stops() {
        let state = tempdir().expect("state");
        let site = site();
        let mut core = Core::open(state.path().to_path_buf(), FAST);
        let (tx, rx) = channel::<Vec<Entry>>();
        core.subscribe(Box::new(move |entries: &[Entry]| {
            let _ = tx.send(entries.to_vec());
        }));
        core.select_directory(site.path()).expect("select");

        write_entry(site.path(), "email_late", 1);
        core.shutdown();
        core.shutdown();

        assert!(core.watched_root().is_none());
        assert!(rx.recv_timeout(Duration::from_millis(600)).is_err());
    }

    #[test]
    fn selecting_after_shutdown_resumes_notifications() {
        let state = tempdir().expect("state");
        let site = site();
        let mut core = Core::open(state.path().to_path_buf(), FAST);
        core.shutdown();

        let (tx, rx) = channel::<Vec<Entry>>();
        core.subscribe(Box::new(move |entries: &[Entry]| {
            let _ = tx.send(entries.to_vec());
        }));
        core.select_directory(site.path()).expect("select");
        write_entry(site.path(), "email_1", 1);

        let snapshot = rx.recv_timeout(Duration::from_secs(5)).expect("snapshot");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "email_1");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entries_dir_still_selects_with_empty_log() {
        use std::os::unix::fs::PermissionsExt;

        let state = tempdir().expect("state");
        let site = site();
        write_entry(site.path(), "email_1", 1);
        let dir = entries_dir(site.path());
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o300)).expect("chmod");
        if fs::read_dir(&dir).is_ok() {
            // Running as root: permissions are not enforced.
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("chmod");
            return;
        }

        let mut core = Core::open(state.path().to_path_buf(), FAST);
        let selection = core.select_directory(site.path());
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("chmod");

        let selection = selection.expect("select");
        assert!(selection.entries.is_empty());
        assert_eq!(selection.recents, vec![site.path().to_path_buf()]);
    }

    #[test]
    fn uninstall_removes_shim() {
        let state = tempdir().expect("state");
        let site = site();
        let mut core = Core::open(state.path().to_path_buf(), FAST);
        core.select_directory(site.path()).expect("select");

        core.uninstall_shim(site.path()).expect("uninstall");
        core.uninstall_shim(site.path()).expect("uninstall again");
        assert!(!shim_path(site.path()).exists());
    }
}
