//! Watch Session: the live subscription plus bookkeeping for one folder.
//!
//! A session watches exactly one folder, non-recursively: the platform
//! notification mechanism is not inherently recursive, so every discovered
//! subfolder gets a sibling session of its own instead of extending the
//! parent's subscription. Removal of an ancestor folder is consequently
//! observed by each descendant session through its own subscription and is
//! not cascaded by the parent; whether the platform reliably delivers that
//! remove event is platform-dependent (on Linux/inotify it is).

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::entry::Entry;
use super::error::WatchError;
use super::manager::WatchShared;
use super::tailer::Tailer;

type FileMap = Arc<Mutex<HashMap<PathBuf, Tailer>>>;

/// One folder under observation: its filesystem subscription, its active
/// followers, and the stop signal for its tasks.
#[derive(Debug)]
pub(crate) struct WatchSession {
    /// Folder path as configured or discovered; entry provenance and logs.
    display: PathBuf,
    /// Single stop signal observed by all of the session's tasks.
    cancel: CancellationToken,
    /// Canonical file path → active follower.
    files: FileMap,
}

/// Everything the scan and the event task need to dispatch one path.
struct SessionCtx {
    /// Canonical path of the watched folder; the key space of `files` and
    /// of event paths.
    folder: PathBuf,
    /// Folder path as configured or discovered.
    display: PathBuf,
    shared: Arc<WatchShared>,
    files: FileMap,
    local_tx: UnboundedSender<Entry>,
}

impl WatchSession {
    /// Scans `folder`, subscribes to its filesystem events, and spawns the
    /// session tasks: event processing, entry forwarding, and (when
    /// inactivity eviction is enabled) the eviction timer.
    ///
    /// Subfolders found during the scan register sibling sessions through
    /// `shared`; their failures are logged and skipped there.
    ///
    /// # Errors
    ///
    /// Returns an error when the folder cannot be scanned or subscribed.
    pub(crate) fn open(
        folder: PathBuf,
        display_path: PathBuf,
        shared: &Arc<WatchShared>,
    ) -> Result<Self, WatchError> {
        let files: FileMap = Arc::new(Mutex::new(HashMap::new()));
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let ctx = SessionCtx {
            folder: folder.clone(),
            display: display_path.clone(),
            shared: Arc::clone(shared),
            files: Arc::clone(&files),
            local_tx,
        };

        let dir = std::fs::read_dir(&folder).map_err(|source| WatchError::Scan {
            path: display_path.clone(),
            source,
        })?;
        for dent in dir.flatten() {
            consider_path(&ctx, &dent.path());
        }

        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = fs_tx.send(event);
        })?;
        watcher.watch(&folder, RecursiveMode::NonRecursive)?;

        let cancel = CancellationToken::new();
        let activity = shared
            .inactivity_timeout
            .map(|_| Arc::new(Notify::new()));

        tokio::spawn(run_events(watcher, fs_rx, ctx, cancel.clone()));
        tokio::spawn(forward_entries(
            local_rx,
            Arc::clone(shared),
            activity.clone(),
            cancel.clone(),
        ));
        if let (Some(timeout), Some(activity)) = (shared.inactivity_timeout, activity) {
            tokio::spawn(run_eviction_timer(
                timeout,
                activity,
                folder,
                display_path.clone(),
                Arc::clone(shared),
                cancel.clone(),
            ));
        }

        tracing::info!(folder = %display_path.display(), "watching folder");
        Ok(Self {
            display: display_path,
            cancel,
            files,
        })
    }

    /// Tears the session down: signals its tasks to stop and kills every
    /// registered follower. Teardown is complete when this returns: no
    /// follower remains and no further entries are forwarded.
    pub(crate) async fn close(self) {
        self.cancel.cancel();
        let tailers: Vec<Tailer> = {
            let mut files = lock(&self.files);
            files.drain().map(|(_, tailer)| tailer).collect()
        };
        for tailer in tailers {
            tailer.kill().await;
        }
        tracing::info!(folder = %self.display.display(), "watch session closed");
    }
}

/// Event-processing task: dispatches filesystem notifications until the
/// stop signal fires or the watcher backend goes away. Owning the watcher
/// here ties the subscription's lifetime to the task.
async fn run_events(
    watcher: RecommendedWatcher,
    mut events: UnboundedReceiver<Result<notify::Event, notify::Error>>,
    ctx: SessionCtx,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(Ok(event)) => handle_event(&ctx, &event).await,
                Some(Err(e)) => {
                    tracing::error!(folder = %ctx.display.display(), error = %e, "watcher error");
                }
                None => break,
            },
        }
    }
    drop(watcher);
}

async fn handle_event(ctx: &SessionCtx, event: &notify::Event) {
    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                consider_path(ctx, path);
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                handle_removed(ctx, path).await;
            }
        }
        _ => {}
    }
}

/// Dispatches one discovered path exactly as the initial scan does:
/// recurse into visible subfolders when recursion is on, or filter,
/// stale-check and tail regular files.
fn consider_path(ctx: &SessionCtx, path: &Path) {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unable to stat path, ignoring");
            return;
        }
    };
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return;
    };
    let display_path = ctx.display.join(&name);

    if meta.is_dir() {
        if ctx.shared.recursive && !is_hidden(&name) {
            ctx.shared.add_session(path.to_path_buf(), display_path);
        }
        return;
    }

    if !ctx.shared.filename_filter.matches(&name) {
        return;
    }
    if let Some(threshold) = ctx.shared.stale_threshold {
        if is_stale(&meta, threshold) {
            tracing::info!(path = %display_path.display(), "discarding stale file");
            return;
        }
    }

    let previous = lock(&ctx.files).remove(path);
    if let Some(previous) = previous {
        // keep at most one follower per path; the replacement wins
        tracing::debug!(path = %display_path.display(), "replacing existing follower");
        tokio::spawn(previous.kill());
    }
    if let Some(tailer) = Tailer::spawn(
        path,
        &display_path,
        ctx.shared.content_filter.clone(),
        ctx.shared.host.clone(),
        ctx.local_tx.clone(),
    ) {
        lock(&ctx.files).insert(path.to_path_buf(), tailer);
    }
}

/// Remove events either name this session's own folder (self-teardown) or
/// a file directly inside it.
async fn handle_removed(ctx: &SessionCtx, path: &Path) {
    if path == ctx.folder {
        tracing::info!(folder = %ctx.display.display(), "watched folder removed, closing session");
        ctx.shared.evict(&ctx.folder).await;
        return;
    }

    let removed = lock(&ctx.files).remove(path);
    match removed {
        Some(tailer) => {
            tailer.kill().await;
            tracing::info!(path = %path.display(), "stopped tailing removed file");
        }
        None => {
            tracing::warn!(path = %path.display(), "removed path was not being tailed");
        }
    }
}

/// Entry-forwarding task: drains the session's local queue into the
/// manager's shared queue, pulsing the inactivity timer on every entry.
async fn forward_entries(
    mut local_rx: UnboundedReceiver<Entry>,
    shared: Arc<WatchShared>,
    activity: Option<Arc<Notify>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            entry = local_rx.recv() => match entry {
                Some(entry) => {
                    if let Some(activity) = &activity {
                        activity.notify_one();
                    }
                    if shared.forward(entry).is_err() {
                        // sink is gone; nothing left to forward to
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// Inactivity-eviction task: a debounced countdown owned by a single task.
/// Every activity pulse restarts the window by re-entering the loop with a
/// fresh sleep; expiry tears the session down exactly as if its folder had
/// been removed.
async fn run_eviction_timer(
    timeout: Duration,
    activity: Arc<Notify>,
    folder: PathBuf,
    display_path: PathBuf,
    shared: Arc<WatchShared>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = activity.notified() => {}
            () = tokio::time::sleep(timeout) => {
                tracing::info!(
                    folder = %display_path.display(),
                    timeout_secs = timeout.as_secs(),
                    "no entries within the inactivity window, evicting folder"
                );
                shared.evict(&folder).await;
                return;
            }
        }
    }
}

fn lock(files: &FileMap) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Tailer>> {
    files.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unix convention: names starting with a dot are hidden and never
/// watched. The diagnostic log folder relies on this.
fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// A file is stale when its last modification is older than the threshold
/// at discovery time.
fn is_stale(meta: &std::fs::Metadata, threshold: Duration) -> bool {
    meta.modified()
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > threshold)
}

/// Drops `.` segments so joined display paths read the way operators typed
/// them (`./sub/x.log` becomes `sub/x.log`).
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
