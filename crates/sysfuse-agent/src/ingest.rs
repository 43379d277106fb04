//! Webhook listener for security syscall notifications.
//!
//! Falco posts one JSON alert per matched event; only
//! `output_fields["syscall.type"]` is used. Any event without a usable label
//! is accepted and ignored so a misconfigured rule cannot break delivery.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use sysfuse_collector::SyscallAggregator;

pub const FALCO_WEBHOOK_PATH: &str = "/agent-service/falco";

#[derive(Debug, Default, Deserialize)]
pub struct FalcoEvent {
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub output_fields: OutputFields,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputFields {
    #[serde(rename = "syscall.type", default)]
    pub syscall_type: Option<String>,
}

impl FalcoEvent {
    pub fn syscall_type(&self) -> Option<&str> {
        self.output_fields.syscall_type.as_deref()
    }
}

pub fn build_http_app(aggregator: Arc<SyscallAggregator>) -> Router {
    Router::new()
        .route(FALCO_WEBHOOK_PATH, post(falco_webhook))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(aggregator)
}

async fn falco_webhook(State(aggregator): State<Arc<SyscallAggregator>>, body: Bytes) -> StatusCode {
    let event: FalcoEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "Discarding undecodable webhook body");
            return StatusCode::BAD_REQUEST;
        }
    };

    match event.syscall_type() {
        Some(name) if !name.is_empty() => aggregator.ingest(name),
        _ => tracing::debug!(rule = ?event.rule, "Webhook event without syscall.type, ignored"),
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    async fn post_body(app: Router, body: &str) -> StatusCode {
        let req = Request::builder()
            .method("POST")
            .uri(FALCO_WEBHOOK_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn falco_event_increments_counter() {
        let aggregator = Arc::new(SyscallAggregator::new());
        let app = build_http_app(aggregator.clone());
        let body = r#"{
            "hostname": "node-1",
            "output": "File opened",
            "priority": "Notice",
            "rule": "Track open",
            "source": "syscall",
            "tags": ["filesystem"],
            "time": "2024-05-01T12:00:00.000000000Z",
            "output_fields": {"evt.time": 1714564800000000000, "syscall.type": "openat", "proc.name": null}
        }"#;

        assert_eq!(post_body(app.clone(), body).await, StatusCode::NO_CONTENT);
        assert_eq!(post_body(app, body).await, StatusCode::NO_CONTENT);

        let counts = aggregator.snapshot_and_reset();
        assert_eq!(counts.get("openat"), Some(&2));
    }

    #[tokio::test]
    async fn missing_or_empty_label_is_a_noop() {
        let aggregator = Arc::new(SyscallAggregator::new());
        let app = build_http_app(aggregator.clone());

        for body in [
            r#"{"rule": "x"}"#,
            r#"{"output_fields": {}}"#,
            r#"{"output_fields": {"syscall.type": null}}"#,
            r#"{"output_fields": {"syscall.type": ""}}"#,
        ] {
            assert_eq!(post_body(app.clone(), body).await, StatusCode::NO_CONTENT);
        }
        assert!(aggregator.snapshot_and_reset().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_without_side_effects() {
        let aggregator = Arc::new(SyscallAggregator::new());
        let app = build_http_app(aggregator.clone());

        assert_eq!(post_body(app, "{not json").await, StatusCode::BAD_REQUEST);
        assert_eq!(aggregator.pending(), 0);
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_http_app(Arc::new(SyscallAggregator::new()));
        let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
