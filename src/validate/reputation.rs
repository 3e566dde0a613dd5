//! Reputation service client: asks the external allow-list ("whitelist")
//! service whether a domain or IP is known to be benign.
//!
//! Lookups retry with linear backoff and known answers are cached for a fixed
//! expiry. Concurrent lookups for the same host share one in-flight request
//! sequence; lookups for different hosts run in parallel.
//!
//! When every try fails the verdict is `Unknown`, and unknown reputation is
//! treated as "not allow-listed" (see [`ReputationVerdict::is_allow_listed`]).

use crate::config::ReputationConfig;
use crate::validate::network::NetworkInspector;
use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Placeholder replaced by the host token in endpoint templates.
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Which endpoint a host is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Domain,
    Ip,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::Domain => write!(f, "domain"),
            HostKind::Ip => write!(f, "ip"),
        }
    }
}

/// What the reputation service said about a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationVerdict {
    AllowListed,
    NotAllowListed,
    /// No usable answer after all tries
    Unknown,
}

impl ReputationVerdict {
    /// Unknown reputation counts as not allow-listed, so a host the service
    /// could not vouch for still goes through the remaining checks.
    pub fn is_allow_listed(self) -> bool {
        match self {
            ReputationVerdict::AllowListed => true,
            ReputationVerdict::NotAllowListed => false,
            ReputationVerdict::Unknown => false,
        }
    }
}

impl From<bool> for ReputationVerdict {
    fn from(allow_listed: bool) -> Self {
        if allow_listed {
            ReputationVerdict::AllowListed
        } else {
            ReputationVerdict::NotAllowListed
        }
    }
}

/// Source of reputation verdicts for the orchestrator.
#[async_trait]
pub trait ReputationCheck: Send + Sync {
    async fn check(&self, kind: HostKind, host: &str) -> ReputationVerdict;
}

/// Every try failed; carries the last failure for logging.
#[derive(Debug, Clone, Error)]
#[error("no result for {kind} {host} after {tries} tries, last error: {last_error}")]
pub struct ReputationUnknown {
    pub kind: HostKind,
    pub host: String,
    pub tries: u32,
    pub last_error: String,
}

/// Body returned by both endpoints. The echoed host field (`domain` or `ip`)
/// is informational only.
#[derive(Debug, Deserialize)]
struct ReputationResponse {
    #[serde(default)]
    status: String,
    #[serde(default, alias = "ip")]
    domain: String,
    result: bool,
}

/// HTTP client for the reputation service.
pub struct ReputationClient {
    http: reqwest::Client,
    domain_endpoint: String,
    ip_endpoint: String,
    max_tries: u32,
    base_sleep: Duration,
    cache: Cache<String, bool>,
}

impl ReputationClient {
    pub fn new(config: &ReputationConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("phishgate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            domain_endpoint: config.check_domain_api_url.clone(),
            ip_endpoint: config.check_ip_api_url.clone(),
            max_tries: config.max_tries,
            base_sleep: Duration::from_millis(config.sleep_time_ms),
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .build(),
        })
    }

    /// Sleep before the given 1-based try: nothing before the first, then
    /// `base_sleep * try`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.base_sleep.saturating_mul(attempt)
        }
    }

    pub fn endpoint(&self, kind: HostKind, host: &str) -> String {
        let template = match kind {
            HostKind::Domain => &self.domain_endpoint,
            HostKind::Ip => &self.ip_endpoint,
        };
        template.replace(HOST_PLACEHOLDER, host)
    }

    /// Cached answer for a host, if any.
    pub async fn cached(&self, host: &str) -> Option<bool> {
        self.cache.get(host).await
    }

    /// Look a host up, going to the network only on a cache miss. Concurrent
    /// misses on the same host are coalesced into one `fetch`.
    pub async fn lookup(&self, kind: HostKind, host: &str) -> Result<bool, ReputationUnknown> {
        self.cache
            .try_get_with_by_ref(host, self.fetch(kind, host))
            .await
            .map_err(|e| (*e).clone())
    }

    /// Run the retry sequence against the service.
    async fn fetch(&self, kind: HostKind, host: &str) -> Result<bool, ReputationUnknown> {
        let url = self.endpoint(kind, host);
        let mut last_error = String::from("no tries made");

        for attempt in 1..=self.max_tries {
            let pause = self.backoff(attempt);
            if !pause.is_zero() {
                debug!("wl check {} ({} / sleep for {:?})", kind, attempt, pause);
                tokio::time::sleep(pause).await;
            }

            match self.try_once(&url).await {
                Ok(response) => {
                    debug!(
                        "wl check {} ok: {} > {} (status: {}, echoed: {})",
                        kind, host, response.result, response.status, response.domain
                    );
                    return Ok(response.result);
                }
                Err(reason) => {
                    warn!(
                        "wl check {} failed ({} / {}) for {}: {}",
                        kind, attempt, self.max_tries, host, reason
                    );
                    last_error = reason;
                }
            }
        }

        Err(ReputationUnknown {
            kind,
            host: host.to_string(),
            tries: self.max_tries,
            last_error,
        })
    }

    async fn try_once(&self, url: &str) -> Result<ReputationResponse, String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("can't execute request: {}", e))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| format!("can't read response body, status: {}, err: {}", status, e))?;

        if status != reqwest::StatusCode::OK {
            return Err(format!("status = {}", status.as_u16()));
        }

        serde_json::from_slice(&body).map_err(|e| {
            format!(
                "can't parse json from response, body: {}, err: {}",
                trim_body(&body),
                e
            )
        })
    }
}

#[async_trait]
impl ReputationCheck for ReputationClient {
    async fn check(&self, kind: HostKind, host: &str) -> ReputationVerdict {
        // The domain endpoint only understands domain-shaped input.
        if kind == HostKind::Domain && NetworkInspector::is_ip_literal(host) {
            return ReputationVerdict::NotAllowListed;
        }

        match self.lookup(kind, host).await {
            Ok(allow_listed) => ReputationVerdict::from(allow_listed),
            Err(e) => {
                info!("wl check {} - {}", kind, e);
                ReputationVerdict::Unknown
            }
        }
    }
}

/// Shorten large bodies for logs: first and last 200 bytes of anything
/// 500 bytes or longer.
pub fn trim_body(body: &[u8]) -> String {
    if body.len() < 500 {
        String::from_utf8_lossy(body).into_owned()
    } else {
        format!(
            "{}...(CUT)...{}",
            String::from_utf8_lossy(&body[..200]),
            String::from_utf8_lossy(&body[body.len() - 200..])
        )
    }
}
