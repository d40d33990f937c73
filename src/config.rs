//! Runtime configuration consumed by the watch core.
//!
//! Flag parsing lives in the binary; the core only sees this struct.

use std::path::PathBuf;
use std::time::Duration;

use crate::filter::{ContentFilter, FilenameFilter};
use crate::output::OutputFormat;

/// Configuration for one invocation of the watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Root folders to watch. They must not be nested within each other.
    pub folders: Vec<PathBuf>,
    /// Whether discovered subfolders are watched as well.
    pub recursive: bool,
    /// Predicate applied to base filenames during discovery.
    pub filename_filter: FilenameFilter,
    /// Predicate applied to every line read from a follower.
    pub content_filter: ContentFilter,
    /// Operator-supplied label attached to each output line.
    pub tag: String,
    /// Output serialization mode.
    pub format: OutputFormat,
    /// Seconds without accepted lines before a folder session is evicted.
    /// Zero or negative disables eviction.
    pub inactivity_timeout_secs: i64,
    /// Files whose last modification is older than this many seconds are
    /// discarded at discovery time. Zero or negative disables the check.
    pub discard_older_than_secs: i64,
}

impl WatchConfig {
    #[must_use]
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        positive_secs(self.inactivity_timeout_secs)
    }

    #[must_use]
    pub fn stale_threshold(&self) -> Option<Duration> {
        positive_secs(self.discard_older_than_secs)
    }
}

fn positive_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}
