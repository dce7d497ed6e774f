//! Webhook authentication and request tracing middleware.

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// Truncated to MAX_TRACE_ID_LEN characters, non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Attach a trace ID to the request and run it inside a span carrying it.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}

/// Token presented by the caller: the configured header first, then
/// `Authorization` with or without a `Bearer ` scheme. The value is compared
/// as sent; a blank value counts as missing.
fn presented_token<'a>(headers: &'a HeaderMap, header_name: &str) -> Option<&'a str> {
    let from_header = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());
    if from_header.is_some() {
        return from_header;
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            // Scheme is case-insensitive (RFC 6750)
            if v.len() >= 7 && v.is_char_boundary(7) && v[..7].eq_ignore_ascii_case("bearer ") {
                &v[7..]
            } else {
                v
            }
        })
        .filter(|v| !v.trim().is_empty())
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Exact comparison over fixed-length digests, touching every byte.
fn tokens_match(expected: &str, presented: &str) -> bool {
    let expected = digest(expected);
    let presented = digest(presented);
    expected
        .iter()
        .zip(presented.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Reject webhook deliveries that do not carry the shared secret.
///
/// Runs before the body is read. A missing secret disables the check.
pub async fn webhook_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(secret) = state.config.webhook.secret() else {
        return Ok(next.run(req).await);
    };

    let token = presented_token(req.headers(), &state.config.webhook.token_header);
    match token {
        Some(token) if tokens_match(secret, token) => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!("Rejected webhook: token mismatch");
            metrics::record_request("unknown", "unauthorized");
            Err(ApiError::Unauthorized)
        }
        None => {
            tracing::warn!(
                header = %state.config.webhook.token_header,
                "Rejected webhook: token missing"
            );
            metrics::record_request("unknown", "unauthorized");
            Err(ApiError::Unauthorized)
        }
    }
}
