//! Folder Watch Manager: owns every Watch Session and the shared queue.

use std::collections::hash_map;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::entry::Entry;
use super::error::WatchError;
use super::session::{clean_path, WatchSession};
use crate::config::WatchConfig;
use crate::filter::{ContentFilter, FilenameFilter};

/// State shared between the manager and every session task.
///
/// The session registry is the single source of truth for what is being
/// watched: every session reachable from it corresponds to a live
/// subscription, and removing an entry plus releasing its subscription,
/// timer and followers happens through [`WatchShared::evict`] alone.
#[derive(Debug)]
pub(crate) struct WatchShared {
    pub(crate) recursive: bool,
    pub(crate) filename_filter: FilenameFilter,
    pub(crate) content_filter: ContentFilter,
    pub(crate) inactivity_timeout: Option<Duration>,
    pub(crate) stale_threshold: Option<Duration>,
    pub(crate) host: String,
    entry_tx: UnboundedSender<Entry>,
    /// Canonical folder path → live session.
    sessions: Mutex<HashMap<PathBuf, WatchSession>>,
}

impl WatchShared {
    /// Forwards one accepted entry to the shared output queue.
    pub(crate) fn forward(&self, entry: Entry) -> Result<(), SendError<Entry>> {
        self.entry_tx.send(entry)
    }

    /// Registers a Watch Session for a discovered subfolder. Failures are
    /// logged and the subfolder is skipped; the rest of the tree proceeds.
    pub(crate) fn add_session(self: &Arc<Self>, folder: PathBuf, display_path: PathBuf) {
        if let Err(e) = self.try_add_session(folder, &display_path) {
            tracing::error!(folder = %display_path.display(), error = %e, "skipping subfolder");
        }
    }

    fn try_add_session(self: &Arc<Self>, folder: PathBuf, display: &Path) -> Result<(), WatchError> {
        let canonical = folder.canonicalize().map_err(|source| WatchError::Resolve {
            path: folder,
            source,
        })?;
        if self.lock_sessions().contains_key(&canonical) {
            return Ok(());
        }
        let session = WatchSession::open(canonical.clone(), display.to_path_buf(), self)?;
        self.install(canonical, session);
        Ok(())
    }

    /// Inserts a freshly opened session, resolving create-event races: a
    /// loser that finds the slot occupied is closed, not leaked.
    fn install(&self, canonical: PathBuf, session: WatchSession) {
        let mut sessions = self.lock_sessions();
        match sessions.entry(canonical) {
            hash_map::Entry::Occupied(slot) => {
                tracing::debug!(folder = %slot.key().display(), "folder already watched, discarding duplicate session");
                tokio::spawn(session.close());
            }
            hash_map::Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
    }

    /// Removes one folder session, if present, and closes it completely:
    /// subscription cancelled, tasks stopped, followers killed.
    pub(crate) async fn evict(&self, folder: &Path) {
        let session = self.lock_sessions().remove(folder);
        if let Some(session) = session {
            session.close().await;
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<PathBuf, WatchSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Root orchestrator: one Watch Session per watched folder (configured
/// roots plus recursively discovered subfolders), all reachable from a
/// single mutex-guarded registry.
#[derive(Debug)]
pub struct FolderWatchManager {
    shared: Arc<WatchShared>,
}

impl FolderWatchManager {
    /// Creates the manager and the receiving end of the shared entry
    /// queue. No folder is watched until [`FolderWatchManager::watch`] is
    /// called.
    #[must_use]
    pub fn new(config: &WatchConfig) -> (Self, UnboundedReceiver<Entry>) {
        let (entry_tx, entry_rx) = mpsc::unbounded_channel();
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        let shared = Arc::new(WatchShared {
            recursive: config.recursive,
            filename_filter: config.filename_filter.clone(),
            content_filter: config.content_filter.clone(),
            inactivity_timeout: config.inactivity_timeout(),
            stale_threshold: config.stale_threshold(),
            host,
            entry_tx,
            sessions: Mutex::new(HashMap::new()),
        });
        (Self { shared }, entry_rx)
    }

    /// Starts watching one root folder: scans it, tails matching files,
    /// recurses into visible subfolders when recursion is enabled, and
    /// reacts to filesystem events from then on.
    ///
    /// # Errors
    ///
    /// Returns an error when the root cannot be resolved, scanned or
    /// subscribed. Failures beneath the root (discovered subfolders) are
    /// logged and skipped instead.
    pub fn watch(&self, root: &Path) -> Result<(), WatchError> {
        let canonical = root.canonicalize().map_err(|source| WatchError::Resolve {
            path: root.to_path_buf(),
            source,
        })?;
        if self.shared.lock_sessions().contains_key(&canonical) {
            return Ok(());
        }
        let session = WatchSession::open(canonical.clone(), clean_path(root), &self.shared)?;
        self.shared.install(canonical, session);
        Ok(())
    }

    /// Number of live watch sessions (roots plus discovered subfolders).
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.lock_sessions().len()
    }

    /// Canonical paths of every watched folder.
    #[must_use]
    pub fn watched_folders(&self) -> Vec<PathBuf> {
        self.shared.lock_sessions().keys().cloned().collect()
    }

    /// Releases every Watch Session: each one's tasks are stopped and its
    /// follower processes killed before this returns.
    pub async fn close(&self) {
        let sessions: Vec<WatchSession> = {
            let mut map = self.shared.lock_sessions();
            map.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.close().await;
        }
        tracing::info!("folder watch manager closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use tempfile::TempDir;

    fn test_config() -> WatchConfig {
        WatchConfig {
            folders: vec![PathBuf::from(".")],
            recursive: true,
            filename_filter: FilenameFilter::glob("*.log").unwrap(),
            content_filter: ContentFilter::None,
            tag: String::new(),
            format: OutputFormat::Raw,
            inactivity_timeout_secs: -1,
            discard_older_than_secs: -1,
        }
    }

    #[tokio::test]
    async fn watch_missing_root_fails() {
        let (manager, _rx) = FolderWatchManager::new(&test_config());
        let err = manager.watch(Path::new("/tmp/no-such-root-9321"));
        assert!(matches!(err, Err(WatchError::Resolve { .. })));
    }

    #[tokio::test]
    async fn watch_registers_one_session_per_folder() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let (manager, _rx) = FolderWatchManager::new(&test_config());
        match manager.watch(dir.path()) {
            Ok(()) => {}
            Err(WatchError::Notify(e)) => {
                eprintln!("skipping test, platform watcher unavailable: {e}");
                return;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }

        // root plus the discovered subfolder
        assert_eq!(manager.session_count(), 2);
        let watched = manager.watched_folders();
        let sub = dir.path().join("sub").canonicalize().unwrap();
        assert!(watched.contains(&sub));

        // watching the same root again is a no-op
        manager.watch(dir.path()).unwrap();
        assert_eq!(manager.session_count(), 2);

        manager.close().await;
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn non_recursive_ignores_subfolders() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let config = WatchConfig {
            recursive: false,
            ..test_config()
        };
        let (manager, _rx) = FolderWatchManager::new(&config);
        match manager.watch(dir.path()) {
            Ok(()) => {}
            Err(WatchError::Notify(e)) => {
                eprintln!("skipping test, platform watcher unavailable: {e}");
                return;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }

        assert_eq!(manager.session_count(), 1);
        manager.close().await;
    }
}
