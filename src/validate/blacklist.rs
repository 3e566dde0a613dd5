//! URL blacklist: regular expressions compiled once at startup.
//!
//! A URL is blacklisted when any pattern matches somewhere in the full URL
//! string. Blacklisted URLs are never sent downstream.

use regex::Regex;
use thiserror::Error;

/// A blacklist pattern that failed to compile.
#[derive(Debug, Error)]
#[error("blacklist pattern #{position} ({pattern:?}) is invalid")]
pub struct PatternError {
    /// 1-based position in the configured list
    pub position: usize,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Pre-compiled set of blacklist patterns.
#[derive(Debug, Clone)]
pub struct UrlBlacklist {
    patterns: Vec<(String, Regex)>,
}

impl UrlBlacklist {
    /// Compile every pattern. One malformed pattern fails the whole list.
    pub fn new(patterns: &[String]) -> Result<Self, PatternError> {
        let compiled = patterns
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let re = Regex::new(p).map_err(|source| PatternError {
                    position: i + 1,
                    pattern: p.clone(),
                    source,
                })?;
                Ok((p.clone(), re))
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        Ok(Self { patterns: compiled })
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.matching_pattern(url).is_some()
    }

    /// The first pattern that matches, for logging.
    pub fn matching_pattern(&self, url: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(url))
            .map(|(p, _)| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
