//! Prometheus counters and the `/metrics` endpoint.

use crate::validate::Verdict;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct Metrics {
    registry: Registry,
    response_statuses: IntCounterVec,
    decisions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let response_statuses = IntCounterVec::new(
            Opts::new("response_statuses", "HTTP responses by status code"),
            &["status"],
        )?;
        let decisions = IntCounterVec::new(
            Opts::new("decisions", "URL decisions by verdict"),
            &["verdict"],
        )?;

        registry.register(Box::new(response_statuses.clone()))?;
        registry.register(Box::new(decisions.clone()))?;

        Ok(Self {
            registry,
            response_statuses,
            decisions,
        })
    }

    pub fn observe_status(&self, status: StatusCode) {
        self.response_statuses
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn observe_verdict(&self, verdict: Verdict) {
        self.decisions.with_label_values(&[verdict.as_str()]).inc();
    }

    pub fn status_count(&self, status: StatusCode) -> u64 {
        self.response_statuses
            .with_label_values(&[status.as_str()])
            .get()
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Counts every response by status code.
pub async fn track_status(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    metrics.observe_status(response.status());
    response
}

pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
