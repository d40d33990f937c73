//! Filename and line-content predicates.
//!
//! Both filters are built once at startup from the configured kind and
//! pattern; a malformed pattern is fatal before watching begins.

use globset::{Glob, GlobMatcher};
use regex::Regex;

/// Errors raised while compiling filter patterns.
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    /// The glob pattern failed to compile.
    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// The regular expression failed to compile.
    #[error("invalid regex pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Decides whether a discovered file should be tailed, based on its base
/// filename.
#[derive(Debug, Clone)]
pub enum FilenameFilter {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl FilenameFilter {
    /// Builds a glob-based filter.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Glob`] when the pattern does not compile.
    pub fn glob(pattern: &str) -> Result<Self, FilterError> {
        let matcher = Glob::new(pattern)
            .map_err(|source| FilterError::Glob {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();
        Ok(Self::Glob(matcher))
    }

    /// Builds a regex-based filter.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Regex`] when the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self, FilterError> {
        let regex = Regex::new(pattern).map_err(|source| FilterError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self::Regex(regex))
    }

    #[must_use]
    pub fn matches(&self, filename: &str) -> bool {
        match self {
            Self::Glob(matcher) => matcher.is_match(filename),
            Self::Regex(regex) => regex.is_match(filename),
        }
    }
}

/// Decides whether a line read from a followed file is forwarded.
#[derive(Debug, Clone, Default)]
pub enum ContentFilter {
    /// Forward only lines containing the needle.
    Include(String),
    /// Forward only lines not containing the needle.
    Exclude(String),
    /// Forward only lines matching the expression.
    Regex(Regex),
    /// Forward every line.
    #[default]
    None,
}

impl ContentFilter {
    #[must_use]
    pub fn include(needle: impl Into<String>) -> Self {
        Self::Include(needle.into())
    }

    #[must_use]
    pub fn exclude(needle: impl Into<String>) -> Self {
        Self::Exclude(needle.into())
    }

    /// Builds a regex-based content filter.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Regex`] when the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self, FilterError> {
        let regex = Regex::new(pattern).map_err(|source| FilterError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self::Regex(regex))
    }

    #[must_use]
    pub fn accepts(&self, line: &str) -> bool {
        match self {
            Self::Include(needle) => line.contains(needle),
            Self::Exclude(needle) => !line.contains(needle),
            Self::Regex(regex) => regex.is_match(line),
            Self::None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_filter_matches_basenames() {
        let filter = FilenameFilter::glob("file*.log").unwrap();
        assert!(filter.matches("file1.log"));
        assert!(filter.matches("file.log"));
        assert!(!filter.matches("file1.txt"));
        assert!(!filter.matches("other.log"));
    }

    #[test]
    fn glob_filter_rejects_malformed_pattern() {
        let err = FilenameFilter::glob("file[.log").unwrap_err();
        assert!(matches!(err, FilterError::Glob { .. }));
        assert!(err.to_string().contains("file[.log"));
    }

    #[test]
    fn regex_filter_matches_unanchored() {
        let filter = FilenameFilter::regex(r"file.\.[gol]{3}").unwrap();
        assert!(filter.matches("file6.log"));
        assert!(!filter.matches("file6.txt"));
    }

    #[test]
    fn regex_filter_rejects_malformed_pattern() {
        let err = FilenameFilter::regex("file(").unwrap_err();
        assert!(matches!(err, FilterError::Regex { .. }));
    }

    #[test]
    fn content_include_keeps_matching_lines_only() {
        let filter = ContentFilter::include("ERROR");
        assert!(filter.accepts("[ERROR] boom"));
        assert!(!filter.accepts("[INFO] fine"));
    }

    #[test]
    fn content_exclude_drops_matching_lines() {
        let filter = ContentFilter::exclude("INFO");
        assert!(!filter.accepts("[INFO] fine"));
        assert!(filter.accepts("[WARN] hmm"));
    }

    #[test]
    fn content_regex_matches_lines() {
        let filter = ContentFilter::regex(r"^\[.+\]").unwrap();
        assert!(filter.accepts("[WARN] hmm"));
        assert!(!filter.accepts("THIS WILL NOT APPEAR"));
    }

    #[test]
    fn content_no_filter_accepts_everything() {
        let filter = ContentFilter::None;
        assert!(filter.accepts(""));
        assert!(filter.accepts("anything at all"));
    }
}
