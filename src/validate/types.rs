//! Core types for the admission pipeline.
//!
//! A `Submission` is what a producing system hands us; a `Decision` is what the
//! pipeline concludes about the domain behind its URL.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A URL submitted for phishing analysis.
/// Built at the HTTP boundary and, once admitted, forwarded as the task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Which producing system sent the URL (also selects the output exchange)
    #[serde(default)]
    pub source: String,

    /// Whether downstream should keep the fetched material
    #[serde(default, skip_serializing_if = "is_false")]
    pub store: bool,

    /// Absolute http(s) URL to analyse
    #[serde(default)]
    pub url: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Submission {
    pub fn new(source: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            store: false,
            url: url.into(),
        }
    }

    /// Syntactic validation. Collects every problem rather than stopping at
    /// the first one, so the caller gets the full list back.
    pub fn validate(&self) -> Result<(), InvalidSubmission> {
        let mut reasons = Vec::new();

        if self.source.is_empty() {
            reasons.push("source is empty".to_string());
        }

        if self.url.is_empty() {
            reasons.push("url is empty".to_string());
        } else {
            match url::Url::parse(&self.url) {
                Ok(parsed) => {
                    let scheme = parsed.scheme();
                    if scheme != "http" && scheme != "https" {
                        reasons.push(format!("invalid scheme in url: {}", scheme));
                    }
                }
                Err(e) => reasons.push(format!("invalid url (can't parse): {}", e)),
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(InvalidSubmission { reasons })
        }
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src: {}, store: {}, url: {}", self.source, self.store, self.url)
    }
}

/// A submission that failed syntactic validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .reasons.join(", "))]
pub struct InvalidSubmission {
    pub reasons: Vec<String>,
}

/// Why the orchestrator could not reach a decision for a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("received empty url to be parsed")]
    EmptyUrl,

    #[error("can't parse url: {0}")]
    Unparsable(#[from] url::ParseError),

    #[error("parsed empty domain from url")]
    EmptyHost,
}

/// Where the decision chain stopped for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// URL matched a blacklist pattern
    Blacklisted,
    /// Host token looked like an IP literal but did not parse
    InvalidAddress,
    /// Host is a loopback, link-local or configured local address
    LocalAddress,
    /// Reputation service vouches for the host
    AllowListed,
    /// Domain has no address record
    Unresolvable,
    /// Nothing excluded the host, so it goes downstream
    Admitted,
}

impl Verdict {
    pub fn requires_processing(self) -> bool {
        matches!(self, Verdict::Admitted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Blacklisted => "blacklisted",
            Verdict::InvalidAddress => "invalid_address",
            Verdict::LocalAddress => "local_address",
            Verdict::AllowListed => "allow_listed",
            Verdict::Unresolvable => "unresolvable",
            Verdict::Admitted => "admitted",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Host token the decision is keyed by. `None` when the URL was rejected
    /// by the blacklist before it was parsed.
    pub domain: Option<String>,
    pub verdict: Verdict,
    /// True when the verdict came out of the decision cache
    pub cached: bool,
}

impl Decision {
    pub fn requires_processing(&self) -> bool {
        self.verdict.requires_processing()
    }
}
