//! Configuration types, deserialized from the service's YAML file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    pub dispatch: DispatchConfig,
    pub validation: ValidationConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address the HTTP server binds, e.g. "0.0.0.0:8080"
    pub listen: String,
    /// Referrer name -> token expected in the Authorization header
    #[serde(default)]
    pub auth_tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// AMQP connection string
    pub dsn: String,
    /// Exchange used when the task source has no dedicated one
    pub exchange: String,
    /// Task source -> exchange. May be empty: every source then goes to
    /// `exchange`.
    #[serde(default)]
    pub exchanges: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub url_blacklist_regexps: Vec<String>,
    pub local_ip_nets: Vec<String>,
    /// Nameservers for forward lookups; empty means the system configuration
    #[serde(default)]
    pub nameservers: Vec<SocketAddr>,
    #[serde(default = "default_decision_cache_ttl")]
    pub decision_cache_ttl_secs: u64,
    #[serde(default = "default_decision_cache_capacity")]
    pub decision_cache_capacity: u64,
    pub reputation: ReputationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Endpoint template with a `{host}` placeholder
    pub check_domain_api_url: String,
    pub check_ip_api_url: String,
    pub max_tries: u32,
    /// Base backoff; try n waits n times this long
    pub sleep_time_ms: u64,
    #[serde(default = "default_reputation_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSONL file audit records are appended to
    pub path: PathBuf,
    /// Service name stamped on every record
    pub who: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_decision_cache_ttl() -> u64 {
    30 * 60
}
fn default_decision_cache_capacity() -> u64 {
    100_000
}
fn default_reputation_cache_ttl() -> u64 {
    60 * 60
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
