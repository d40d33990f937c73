//! Line Source: follows a single file through an external follower process.
//!
//! The follower (`tail -f -n 0`) emits only bytes appended after it
//! started, so previously written content is never replayed. Its stdout is
//! scanned into lines, run through the content filter, and forwarded as
//! [`Entry`] values on the owning session's local queue.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::entry::Entry;
use crate::filter::ContentFilter;

/// Grace period between SIGTERM and SIGKILL when stopping a follower.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

/// A single followed file: the follower process plus the task scanning its
/// output into entries.
#[derive(Debug)]
pub(crate) struct Tailer {
    path: PathBuf,
    child: Child,
    reader: JoinHandle<()>,
    stderr_reader: Option<JoinHandle<()>>,
}

impl Tailer {
    /// Starts following `path`, reporting entries under the working path
    /// `display`.
    ///
    /// Returns `None` (no handle) when the path is missing, is a directory,
    /// or the follower cannot be spawned. These are expected races between
    /// discovery and filesystem mutation, logged as warnings rather than
    /// escalated.
    pub(crate) fn spawn(
        path: &Path,
        display_path: &Path,
        filter: ContentFilter,
        host: String,
        entries: UnboundedSender<Entry>,
    ) -> Option<Self> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                tracing::warn!(path = %path.display(), "not a regular file, skipping tail");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot stat file to tail, skipping");
                return None;
            }
        }

        let mut child = match Command::new("tail")
            .args(["-f", "-n", "0"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to spawn follower process");
                return None;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            tracing::warn!(path = %path.display(), "follower has no stdout, skipping");
            return None;
        };
        let reader = tokio::spawn(scan_lines(
            stdout,
            display_path.to_path_buf(),
            filter,
            host,
            entries,
        ));
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(log_stderr(stderr, display_path.to_path_buf())));

        tracing::info!(path = %display_path.display(), "started tailing");
        Some(Self {
            path: display_path.to_path_buf(),
            child,
            reader,
            stderr_reader,
        })
    }

    /// Stops the follower process and waits for the scanning task to
    /// finish, so no further entries can be produced once this returns.
    /// Best-effort: a follower that cannot be killed is logged, not
    /// retried.
    pub(crate) async fn kill(mut self) {
        terminate(&mut self.child, &self.path).await;
        let _ = self.reader.await;
        if let Some(task) = self.stderr_reader {
            let _ = task.await;
        }
        tracing::debug!(path = %self.path.display(), "follower stopped");
    }
}

/// Scans follower stdout into lines, filters them, and forwards entries.
async fn scan_lines(
    stdout: impl AsyncRead + Unpin,
    display_path: PathBuf,
    filter: ContentFilter,
    host: String,
    entries: UnboundedSender<Entry>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !filter.accepts(&line) {
                    continue;
                }
                if entries.send(Entry::new(display_path.clone(), host.clone(), line)).is_err() {
                    // session is gone
                    break;
                }
            }
            Ok(None) => {
                tracing::info!(path = %display_path.display(), "follower output closed");
                break;
            }
            Err(e) => {
                tracing::warn!(path = %display_path.display(), error = %e, "error reading follower output");
                break;
            }
        }
    }
}

/// Follower diagnostics go to the log, never into the entry stream.
async fn log_stderr(stderr: impl AsyncRead + Unpin, display_path: PathBuf) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(path = %display_path.display(), "follower: {line}");
    }
}

/// Requests follower termination: SIGTERM first, SIGKILL after the grace
/// period. A follower that already exited has its status logged instead.
async fn terminate(child: &mut Child, path: &Path) {
    if let Ok(Some(status)) = child.try_wait() {
        if status.success() {
            tracing::debug!(path = %path.display(), "follower already exited");
        } else {
            tracing::warn!(path = %path.display(), %status, "follower exited with failure");
        }
        return;
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            let _ = kill(nix_pid, Signal::SIGTERM);

            match tokio::time::timeout(TERMINATE_TIMEOUT, child.wait()).await {
                Ok(Ok(_)) => return,
                Ok(Err(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to wait for follower");
                    return;
                }
                Err(_) => {
                    tracing::debug!(path = %path.display(), "follower ignored SIGTERM, killing");
                }
            }
        }
    }

    if let Err(e) = child.kill().await {
        tracing::warn!(path = %path.display(), error = %e, "failed to kill follower process");
    }
}
