//! Static token authentication for `/v1/*`.

use crate::gateway::protocol::ApiError;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the configured token a request authenticated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer(pub String);

pub struct AuthTokens {
    /// normalized token -> referrer name
    by_token: HashMap<String, String>,
}

impl AuthTokens {
    pub fn new(tokens: &HashMap<String, String>) -> Self {
        let by_token = tokens
            .iter()
            .map(|(name, token)| (normalize(token), name.clone()))
            .collect();
        Self { by_token }
    }

    /// Referrer for a header value. Comparison ignores surrounding whitespace
    /// and case.
    pub fn referrer(&self, header: &str) -> Option<&str> {
        self.by_token.get(&normalize(header)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

fn normalize(token: &str) -> String {
    token.trim().to_lowercase()
}

pub async fn require_token(
    State(tokens): State<Arc<AuthTokens>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if header.trim().is_empty() {
        return Err(ApiError::unauthorized(
            "auth token 'Authorization' is missing or empty",
        ));
    }

    let Some(referrer) = tokens.referrer(header) else {
        return Err(ApiError::unauthorized("auth token 'Authorization' is invalid"));
    };
    let referrer = Referrer(referrer.to_string());

    request.extensions_mut().insert(referrer);
    Ok(next.run(request).await)
}
