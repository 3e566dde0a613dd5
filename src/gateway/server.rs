//! HTTP front door.
//!
//! Routes:
//! - `GET /status` liveness, no auth
//! - `GET /metrics` Prometheus text, no auth
//! - `POST /v1/url/add` submit a URL; requires a configured token in the
//!   `Authorization` header
//!
//! An accepted submission goes through the validator; admitted ones are
//! published to the dispatch router and an audit record is written in the
//! background.

use crate::audit::{AuditEvent, AuditSink, ACTION_ADD_URL};
use crate::dispatch::DispatchRouter;
use crate::gateway::auth::{require_token, AuthTokens, Referrer};
use crate::gateway::metrics::{metrics_handler, track_status, Metrics};
use crate::gateway::protocol::{ApiError, ResultReply, StatusReply};
use crate::validate::{Submission, Validator};
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, State};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<Validator>,
    pub dispatcher: Arc<DispatchRouter>,
    pub audit: AuditSink,
    pub metrics: Arc<Metrics>,
    pub tokens: Arc<AuthTokens>,
}

impl FromRef<AppState> for Arc<Metrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

impl FromRef<AppState> for Arc<AuthTokens> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/v1/url/add", post(add_url))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/status", get(status))
        .route("/metrics", get(metrics_handler))
        .merge(v1)
        .layer(middleware::from_fn_with_state(state.clone(), track_status))
        .with_state(state)
}

async fn status() -> Json<StatusReply> {
    Json(StatusReply {
        status: "ok".to_string(),
    })
}

async fn add_url(
    State(state): State<AppState>,
    Extension(referrer): Extension<Referrer>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<Json<ResultReply>, ApiError> {
    let started = Instant::now();
    let span = info_span!("add_url", request_id = %Uuid::new_v4(), referrer = %referrer.0);

    handle_add_url(state, referrer, payload, started)
        .instrument(span)
        .await
}

async fn handle_add_url(
    state: AppState,
    referrer: Referrer,
    payload: Result<Json<Submission>, JsonRejection>,
    started: Instant,
) -> Result<Json<ResultReply>, ApiError> {
    info!("received a new task: {}", ACTION_ADD_URL);

    let Json(submission) = payload.map_err(|e| {
        ApiError::bad_request(format!(
            "invalid add url task: can't parse json: {}",
            e.body_text()
        ))
    })?;

    submission
        .validate()
        .map_err(|e| ApiError::bad_request(format!("invalid add url task: {}", e)))?;

    let decision = state
        .validator
        .decide(&submission.url)
        .await
        .map_err(|e| ApiError::internal(format!("failed to check url: {}", e)))?;
    state.metrics.observe_verdict(decision.verdict);

    if !decision.requires_processing() {
        return Ok(Json(ResultReply::message(format!(
            "url does not need to be added into the phishing system: {}",
            submission.url
        ))));
    }

    let payload = serde_json::to_vec(&submission).map_err(|e| {
        ApiError::internal(format!(
            "failed to marshal an 'add url' task to json: {}",
            e
        ))
    })?;

    state
        .dispatcher
        .dispatch(&submission.source, "", &payload)
        .await
        .map_err(|e| ApiError::unavailable(format!("failed to dispatch url: {}", e)))?;
    info!("pushed task ({}): {}", ACTION_ADD_URL, submission);

    state.audit.emit(
        AuditEvent {
            referrer: referrer.0,
            action: ACTION_ADD_URL.to_string(),
            success: true,
            url: submission.url,
            domain: decision.domain.unwrap_or_default(),
            source: submission.source,
            store: submission.store,
            desc: None,
        },
        started,
    );

    Ok(Json(ResultReply::ok()))
}

pub struct GatewayServer {
    listener: TcpListener,
    state: AppState,
}

impl GatewayServer {
    pub async fn bind(listen: &str, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("Failed to bind HTTP listener: {}", listen))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("HTTP server listening on {}", self.local_addr()?);
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed")
    }
}
