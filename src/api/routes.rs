//! HTTP API route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{health, metrics_text, ready, resume, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status and operator actions
        .route("/api/v1/status", get(status))
        .route("/api/v1/risk/resume", post(resume))
        .route("/metrics", get(metrics_text))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::fixtures;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(fixtures::state());
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_when_not_ready() {
        let app = create_router(fixtures::state());
        let (status, _) = get_json(app, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_200_when_ready() {
        let state = fixtures::state();
        state.set_ready(true);
        let (status, _) = get_json(create_router(state), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn halted_engine_is_not_ready() {
        let state = fixtures::state();
        state.set_ready(true);
        state.risk.write().await.halt("manual");

        let (status, body) = get_json(create_router(state.clone()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["halted"], "manual");

        let (_, body) = get_json(create_router(state), "/api/v1/status").await;
        assert_eq!(body["status"], "halted");
    }

    #[tokio::test]
    async fn status_reports_risk_and_session() {
        let state = fixtures::state();
        state.set_ready(true);
        let (status, body) = get_json(create_router(state), "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["tracked_symbols"], 0);
        assert_eq!(body["session"]["trades"], 0);
        assert_eq!(body["risk"]["consecutive_losses"], 0);
    }

    #[tokio::test]
    async fn resume_clears_halt() {
        let state = fixtures::state();
        state.risk.write().await.halt("manual");

        let response = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/risk/resume")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.risk.read().await.is_halted());
    }
}
