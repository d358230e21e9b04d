//! HTTP API layer
//!
//! Three concerns share the router: webhook intake (any path, so senders can
//! point their hook wherever they like), the runner control plane under
//! `/pipelines`, and a health check.

pub mod error;
pub mod health;
pub mod pipeline;
pub mod webhook;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::orchestrator::Orchestrator;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: Vec<u8>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Runner control plane
        .route("/pipelines/claim", post(pipeline::claim_pipeline))
        .route("/pipelines/{id}", post(pipeline::pipeline_done))
        // Webhook intake on any remaining path
        .route("/", post(webhook::webhook_handler))
        .route("/{*path}", post(webhook::webhook_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::value::RawValue;
    use tower::ServiceExt;

    use pocketci_core::domain::event::{EventEnvelope, GitInfo};
    use pocketci_core::domain::pipeline::{Pipeline, PipelineRun};
    use pocketci_engine::EngineCli;

    use crate::dispatch::Dispatcher;
    use crate::repo::Fetcher;
    use crate::vcs::github::compute_signature;

    const SECRET: &[u8] = b"test-secret";

    fn test_state() -> AppState {
        let dispatcher = Arc::new(Dispatcher::new());
        let orchestrator = Arc::new(Orchestrator::new(
            dispatcher,
            EngineCli::new("dagger"),
            Fetcher::new(None).unwrap(),
        ));
        AppState {
            orchestrator,
            webhook_secret: SECRET.to_vec(),
        }
    }

    fn seed_run(state: &AppState) -> i64 {
        let raw = RawValue::from_string(r#"{"action":"opened"}"#.to_string()).unwrap();
        state.orchestrator.dispatcher.enqueue(
            &raw,
            &EventEnvelope::default(),
            &GitInfo {
                branch: "main".to_string(),
                sha: "abc".to_string(),
            },
            &[Pipeline {
                name: "checks".to_string(),
                exec: "test".to_string(),
                repository: "pocketci/pocketci".to_string(),
                ..Default::default()
            }],
        );
        1
    }

    fn webhook_request(path: &str, body: &[u8], signature: &str, event: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("x-hub-signature", signature);
        if let Some(event) = event {
            builder = builder.header("x-github-event", event);
        }
        builder.body(Body::from(body.to_vec())).unwrap()
    }

    #[tokio::test]
    async fn webhook_without_signature_is_unauthorized() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_unauthorized() {
        let app = create_router(test_state());
        let response = app
            .oneshot(webhook_request(
                "/webhook",
                b"{}",
                "sha1=deadbeef",
                Some("push"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_with_valid_signature_is_accepted() {
        let app = create_router(test_state());
        let body = br#"{"zen":"Keep it logically awesome."}"#;
        let signature = compute_signature(body, SECRET);

        // Unsupported events are logged and still acknowledged: senders do
        // not retry on 2xx.
        let response = app
            .oneshot(webhook_request(
                "/webhook",
                body,
                &signature,
                Some("issue_comment"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn webhook_is_accepted_on_any_path() {
        let body = b"{}";
        let signature = compute_signature(body, SECRET);

        for path in ["/", "/webhook", "/hooks/github"] {
            let app = create_router(test_state());
            let response = app
                .oneshot(webhook_request(path, body, &signature, Some("ping")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED, "path {path}");
        }
    }

    #[tokio::test]
    async fn webhook_without_event_header_is_bad_request() {
        let app = create_router(test_state());
        let body = b"{}";
        let signature = compute_signature(body, SECRET);

        let response = app
            .oneshot(webhook_request("/webhook", body, &signature, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn claim_on_empty_queue_is_no_content() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/pipelines/claim")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"runner_name":"r1"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn claim_and_complete_round_trip() {
        let state = test_state();
        let id = seed_run(&state);
        let app = create_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/pipelines/claim")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"runner_name":"r1"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let run: PipelineRun = serde_json::from_slice(&body).unwrap();
        assert_eq!(run.id, id);
        assert_eq!(run.call, "test");

        let request = Request::builder()
            .method("POST")
            .uri(format!("/pipelines/{}", run.id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn completing_unknown_pipeline_is_not_found() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/pipelines/999")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = create_router(test_state());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
