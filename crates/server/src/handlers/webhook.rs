//! Registry webhook ingress.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use regsync_core::normalize::{match_delete, match_push};
use regsync_core::{DeleteTarget, EventKind, ImageRef};
use regsync_metadata::MetadataResult;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use time::OffsetDateTime;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// `ok` or `ignored`.
    pub status: &'static str,
    /// Pairs marked pulled (push events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
    /// Pairs marked deleted (delete events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
}

impl WebhookResponse {
    fn ignored() -> Self {
        Self {
            status: "ignored",
            updated: None,
            deleted: None,
        }
    }

    fn updated(count: usize) -> Self {
        Self {
            status: "ok",
            updated: Some(count),
            deleted: None,
        }
    }

    fn deleted(count: usize) -> Self {
        Self {
            status: "ok",
            updated: None,
            deleted: Some(count),
        }
    }
}

/// POST /webhook - apply a registry push or delete event.
///
/// Pairs are applied in order, each in its own transaction. The first
/// failing pair ends the request with a 500; pairs before it stay committed.
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, bytes = body.len(), "Rejected webhook: body is not JSON");
        metrics::record_request("unknown", "invalid_json");
        ApiError::InvalidJson(e.to_string())
    })?;

    let kind = EventKind::classify(&payload);
    let now = OffsetDateTime::now_utc();

    let result = match kind {
        EventKind::Push => apply_push(&state, &payload, now).await,
        EventKind::Delete => apply_delete(&state, &payload, now).await,
    };

    let outcome = match &result {
        Ok(response) => response.status,
        Err(_) => "error",
    };
    metrics::record_request(kind.as_str(), outcome);

    result.map(Json)
}

async fn apply_push(
    state: &AppState,
    payload: &Value,
    now: OffsetDateTime,
) -> ApiResult<WebhookResponse> {
    let Some(matched) = match_push(payload) else {
        tracing::warn!(kind = "push", "Ignored webhook: no repository/tag pairs found");
        return Ok(WebhookResponse::ignored());
    };
    tracing::debug!(shape = matched.shape, pairs = matched.targets.len(), "Normalized push event");

    for image in &matched.targets {
        let outcome = timed(
            state,
            "pulled",
            image.repository(),
            Some(image.tag()),
            state.metadata.mark_pulled(image, now),
        )
        .await?;
        log_pulled(image, outcome.tag_id, outcome.allow_list_rows);
    }

    Ok(WebhookResponse::updated(matched.targets.len()))
}

async fn apply_delete(
    state: &AppState,
    payload: &Value,
    now: OffsetDateTime,
) -> ApiResult<WebhookResponse> {
    let Some(matched) = match_delete(payload) else {
        tracing::warn!(kind = "delete", "Ignored webhook: no repository/tag pairs found");
        return Ok(WebhookResponse::ignored());
    };
    tracing::debug!(shape = matched.shape, pairs = matched.targets.len(), "Normalized delete event");

    for target in &matched.targets {
        let outcome = timed(
            state,
            "deleted",
            target.repository(),
            target.tag_name(),
            state.metadata.mark_deleted(target, now),
        )
        .await?;
        log_deleted(target, outcome.allow_list_rows, outcome.pull_states_cleared);
    }

    Ok(WebhookResponse::deleted(matched.targets.len()))
}

/// Run one store transition under the configured timeout, recording its
/// duration and result.
async fn timed<T>(
    state: &AppState,
    transition: &'static str,
    repository: &str,
    tag: Option<&str>,
    op: impl Future<Output = MetadataResult<T>>,
) -> ApiResult<T> {
    let timeout = state.store_timeout();
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, op).await;
    let seconds = started.elapsed().as_secs_f64();

    match result {
        Ok(Ok(value)) => {
            metrics::record_transition(transition, "ok", seconds);
            Ok(value)
        }
        Ok(Err(source)) => {
            metrics::record_transition(transition, "error", seconds);
            tracing::error!(
                transition,
                repository,
                tag = tag.unwrap_or("*"),
                error = %source,
                "Store transition failed"
            );
            Err(ApiError::Persistence {
                repository: repository.to_string(),
                tag: tag.map(str::to_string),
                source,
            })
        }
        Err(_) => {
            metrics::record_transition(transition, "timeout", seconds);
            tracing::error!(
                transition,
                repository,
                tag = tag.unwrap_or("*"),
                timeout_ms = timeout.as_millis() as u64,
                "Store transition timed out"
            );
            Err(ApiError::StoreTimeout {
                repository: repository.to_string(),
                tag: tag.map(str::to_string),
                timeout,
            })
        }
    }
}

fn log_pulled(image: &ImageRef, tag_id: i64, allow_list_rows: u64) {
    tracing::info!(
        repository = image.repository(),
        tag = image.tag(),
        tag_id,
        allow_list_rows,
        "Marked pulled"
    );
}

fn log_deleted(target: &DeleteTarget, allow_list_rows: u64, pull_states_cleared: u64) {
    tracing::info!(
        target = %target,
        repository_wide = target.is_repository_wide(),
        allow_list_rows,
        pull_states_cleared,
        "Marked deleted"
    );
}
