/**
 * READ-ONLY HTTP API - Snapshot and ingest health for dashboards
 *
 * ROUTES:
 * - GET /health           liveness, always open
 * - GET /system/health    ingest counters and stream status
 * - GET /nodes            current snapshot, rows in display order
 * - GET /nodes/{row}      one row, 1-based
 *
 * SECURITY: when `http.api_key` is set, every route except /health needs `x-api-key`.
 * Nothing here writes to the snapshot.
 */

use crate::aggregator::SharedAggregator;
use crate::health::{HealthTracker, IngestHealth};
use crate::view::{row_view, snapshot_view, RowView, SnapshotView};
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{routing::get, Json, Router};
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: SharedAggregator,
    pub health_tracker: HealthTracker,
    pub api_key: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/nodes", get(get_nodes))
        .route("/nodes/{row}", get(get_node_row))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = app.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(next.run(req).await);
    };

    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if !ok {
        warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<IngestHealth> {
    Json(app.health_tracker.get_health(&app.aggregator))
}

// GET /nodes
async fn get_nodes(State(app): State<AppState>) -> Json<SnapshotView> {
    Json(snapshot_view(&app.aggregator.current()))
}

// GET /nodes/{row}
async fn get_node_row(
    State(app): State<AppState>,
    Path(row): Path<usize>,
) -> Result<Json<RowView>, StatusCode> {
    let snapshot = app.aggregator.current();
    let Some(entry) = snapshot.batch.row(row) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(row_view(row, entry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::StatusAggregator;
    use crate::decoder::decode_frame;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(api_key: Option<&str>) -> (Router, SharedAggregator) {
        let aggregator = StatusAggregator::shared();
        let state = AppState {
            aggregator: aggregator.clone(),
            health_tracker: HealthTracker::new(),
            api_key: api_key.map(str::to_string),
        };
        (build_router(state), aggregator)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let resp = router
            .oneshot(HttpRequest::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_nodes_before_first_batch() {
        let (router, _) = app(None);
        let (status, body) = get_json(router, "/nodes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sequence"], 0);
        assert_eq!(body["rows"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_nodes_and_single_row() {
        let (router, agg) = app(None);
        agg.accept(
            decode_frame(br#"{"lastMessageTimes":[{"node":"N1","timeSinceLastMessage":120,"alarm":true},{"node":"N2","timeSinceLastMessage":50,"distance":3.2,"status":"ok"}]}"#)
                .unwrap()
                .unwrap(),
        );

        let (_, body) = get_json(router.clone(), "/nodes").await;
        assert_eq!(body["rows"][0]["node"], "N1");
        assert_eq!(body["rows"][0]["elapsed"], "120 ms");
        assert_eq!(body["rows"][1]["distance"], "3.2");

        let (status, body) = get_json(router.clone(), "/nodes/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["alarm"], false);

        let (status, _) = get_json(router, "/nodes/3").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_system_health() {
        let (router, _) = app(None);
        let (status, body) = get_json(router, "/system/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stream_status"], "closed");
        assert_eq!(body["rows_tracked"], 0);
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let (router, _) = app(Some("secret"));

        let (status, _) = get_json(router.clone(), "/nodes").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let resp = router
            .clone()
            .oneshot(
                HttpRequest::get("/nodes")
                    .header("x-api-key", "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
