use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use super::AppError;
use crate::AppState;

/// Prometheus text exposition content type.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// ─── GET /metrics ────────────────────────────────────────────────
/// Serves the cached snapshot, or 500 once it is too old.

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let Some(text) = state.snapshots.read_fresh(Utc::now(), state.max_age) else {
        let last = state.snapshots.last_success();
        error!(last_success = ?last, "refusing to serve stale metrics");
        return Err(AppError::Stale(match last {
            Some(at) => format!(
                "metrics are stale; last successful refresh at {}",
                at.to_rfc3339()
            ),
            None => "metrics have not been collected yet".into(),
        }));
    };

    Ok(([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], text))
}

// ─── Fallback ────────────────────────────────────────────────────
/// Everything else, `/` included, is a permanent redirect to `/metrics`.

pub async fn redirect_to_metrics() -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/metrics")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{SnapshotStore, STALENESS_LIMIT};
    use crate::server::create_router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(store: SnapshotStore) -> Arc<AppState> {
        Arc::new(AppState {
            snapshots: Arc::new(store),
            max_age: STALENESS_LIMIT,
        })
    }

    async fn get(state: Arc<AppState>, uri: &str) -> axum::response::Response {
        create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn serves_fresh_snapshot() {
        let store = SnapshotStore::new();
        store.replace("# HELP up x\nup 1\n".into(), Utc::now());

        let resp = get(state(store), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            EXPOSITION_CONTENT_TYPE
        );
        assert!(resp.headers().contains_key("X-Response-Time-Us"));

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"# HELP up x\nup 1\n");
    }

    #[tokio::test]
    async fn stale_snapshot_is_500() {
        let store = SnapshotStore::new();
        store.replace("up 1\n".into(), Utc::now() - chrono::Duration::seconds(301));

        let resp = get(state(store), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 500);
        assert!(json["error"].as_str().unwrap().contains("stale"));
    }

    #[tokio::test]
    async fn never_refreshed_is_500() {
        let resp = get(state(SnapshotStore::new()), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn other_paths_redirect_to_metrics() {
        for uri in ["/", "/favicon.ico", "/api/v1/anything"] {
            let resp = get(state(SnapshotStore::new()), uri).await;
            assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY, "{uri}");
            assert_eq!(resp.headers()[header::LOCATION], "/metrics");
        }
    }
}
