//! The output record produced for every accepted line.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One accepted line of output plus its provenance.
///
/// The serialized form carries the stable keys `tag`, `host`, `dirs`,
/// `file`, `msg` and `time`. The working path in `source` is the routing
/// key for follower bookkeeping and the raw-mode label; it is never
/// serialized.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// Operator-supplied label; injected by the output writer.
    pub tag: String,
    /// Hostname of the capturing machine, best-effort.
    pub host: String,
    /// Directory segments of the working path.
    pub dirs: Vec<String>,
    /// Base name of the originating file.
    pub file: String,
    /// Raw line text.
    pub msg: String,
    /// Capture time of the line.
    pub time: DateTime<Utc>,
    #[serde(skip)]
    pub source: PathBuf,
}

impl Entry {
    /// Builds an entry for one accepted line read from `source`.
    #[must_use]
    pub fn new(source: PathBuf, host: impl Into<String>, msg: impl Into<String>) -> Self {
        let file = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dirs = source.parent().map(path_segments).unwrap_or_default();
        Self {
            tag: String::new(),
            host: host.into(),
            dirs,
            file,
            msg: msg.into(),
            time: Utc::now(),
            source,
        }
    }
}

/// Plain name segments of a folder path, root and `.` markers dropped.
fn path_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
