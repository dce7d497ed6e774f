//! Route configuration.

use crate::auth::{trace_middleware, webhook_auth_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Auth wraps only the webhook so probes and scrapes stay open.
    let webhook_routes = Router::new()
        .route("/webhook", post(handlers::receive_webhook))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_auth_middleware,
        ));

    let probe_routes = Router::new()
        .route("/healthz", get(handlers::liveness))
        .route("/readyz", get(handlers::readiness));

    let mut router = Router::new().merge(webhook_routes).merge(probe_routes);

    // When enabled, restrict /metrics to the scraper at the network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
