use axum::{middleware as axum_mw, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the scrape-mode `Router`: `/metrics` plus a redirecting fallback.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Exposition ──────────────────────────────────────────
        .route("/metrics", get(handlers::metrics::get_metrics))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Anything else lands on /metrics ─────────────────────
        .fallback(handlers::metrics::redirect_to_metrics)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(TraceLayer::new_for_http())
}
