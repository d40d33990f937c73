//! Watcher error types.

use std::path::PathBuf;

/// Errors raised while setting up folder watches.
///
/// Only the root folders surface these to the caller; failures on
/// discovered subfolders are logged and the subfolder is skipped.
#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    /// The folder could not be resolved to a canonical path.
    #[error("failed to resolve folder '{path}': {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The initial scan of a folder failed.
    #[error("failed to scan folder '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The platform file watcher rejected a subscription.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_display_names_the_folder() {
        let err = WatchError::Scan {
            path: PathBuf::from("/tmp/gone"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/tmp/gone"));
    }

    #[test]
    fn notify_errors_convert() {
        let err: WatchError = notify::Error::generic("boom").into();
        assert!(matches!(err, WatchError::Notify(_)));
        assert!(err.to_string().contains("file watcher error"));
    }
}
