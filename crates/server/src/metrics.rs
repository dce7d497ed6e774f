//! Prometheus metrics for the webhook receiver.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Label values are bounded (event kind, outcome, transition); repository and
//! tag names never appear in metrics.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Webhook deliveries by event kind and outcome.
pub static WEBHOOK_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "regsync_webhook_requests_total",
            "Total webhook deliveries by event kind and outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("metric creation failed")
});

pub static IMAGE_TRANSITIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "regsync_image_transitions_total",
            "Pull-state transitions applied, by transition and result",
        ),
        &["transition", "result"],
    )
    .expect("metric creation failed")
});

pub static STORE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "regsync_store_duration_seconds",
            "Time spent in a single store transition",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["transition"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(WEBHOOK_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMAGE_TRANSITIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STORE_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record the outcome of one webhook delivery.
pub fn record_request(kind: &str, outcome: &str) {
    WEBHOOK_REQUESTS.with_label_values(&[kind, outcome]).inc();
}

/// Record one store transition.
pub fn record_transition(transition: &str, result: &str, seconds: f64) {
    IMAGE_TRANSITIONS
        .with_label_values(&[transition, result])
        .inc();
    STORE_DURATION
        .with_label_values(&[transition])
        .observe(seconds);
}
