//! Metrics tracking middleware
//!
//! Tracks request latency, counts, and status codes for the JSON metrics
//! endpoint.

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Bucket shared by every request that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Metrics tracking middleware
///
/// Records:
/// - Total request count
/// - Request count per route template and status code
/// - Request latency per route template
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = endpoint_key(request.extensions().get::<MatchedPath>());
    state.increment_requests();

    let response = next.run(request).await;

    let latency_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    state
        .record_request(endpoint, response.status().as_u16(), latency_us)
        .await;

    response
}

/// Route template such as `/api/v1/users/:id`; the key set is bounded by
/// the router, not by what clients send
fn endpoint_key(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use roster_core::AppConfig;
    use tower::ServiceExt;

    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/items/:id", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state.clone(), metrics_middleware))
            .with_state(state)
    }

    async fn hit(app: &Router, uri: &str) {
        app.clone()
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
    }

    #[test]
    fn test_endpoint_key_without_match() {
        assert_eq!(endpoint_key(None), "unmatched");
    }

    #[tokio::test]
    async fn test_keys_by_route_template() {
        let state = Arc::new(AppState::in_memory(AppConfig::default()));
        let app = router(state.clone());

        hit(&app, "/items/1").await;
        hit(&app, "/items/abc").await;

        let metrics = state.metrics.read().await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["/items/:id"].latency_count, 2);
    }

    #[tokio::test]
    async fn test_unmatched_paths_share_one_bucket() {
        let state = Arc::new(AppState::in_memory(AppConfig::default()));
        let app = router(state.clone());

        for i in 0..50 {
            hit(&app, &format!("/junk-{i}/x")).await;
        }

        let metrics = state.metrics.read().await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[UNMATCHED_ENDPOINT].latency_count, 50);
        assert_eq!(metrics[UNMATCHED_ENDPOINT].status_counts[&404], 50);
        assert_eq!(state.get_request_count(), 50);
    }
}
