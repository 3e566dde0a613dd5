//! Audit record written for every dispatched task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ACTION_ADD_URL: &str = "add url";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub time: DateTime<Utc>,

    /// Service name from config
    pub who: String,

    /// Name of the auth token the request came with
    pub referrer: String,

    pub action: String,
    pub success: bool,

    /// Seconds from request start until the record was emitted
    pub duration: f64,

    pub url: String,
    pub domain: String,
    pub source: String,
    pub store: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// What the request handler knows about a dispatched task. The sink fills in
/// `who`, `time` and `duration`.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub referrer: String,
    pub action: String,
    pub success: bool,
    pub url: String,
    pub domain: String,
    pub source: String,
    pub store: bool,
    pub desc: Option<String>,
}
