//! Tests for the webhook router, body buffering and middleware.

use super::*;
use async_trait::async_trait;
use axum::http::Request;
use branch_relay_core::{
    forwarder::{ForwardError, ForwardRequest, ForwardResponse, Forwarder},
    webhook::signature::compute_signature,
    RelayConfig, RuleConfig, RuleStore, WebhookSecret,
};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const SECRET: &str = "s";
const MAIN_PUSH: &str = r#"{"repository":{"full_name":"owner/repo"},"ref":"refs/heads/main"}"#;

// ============================================================================
// Test doubles
// ============================================================================

/// Forwarder that records requests and answers 200, or panics on demand.
#[derive(Default)]
struct RecordingForwarder {
    calls: Mutex<Vec<ForwardRequest>>,
    panic: bool,
}

impl RecordingForwarder {
    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, ForwardError> {
        if self.panic {
            panic!("forwarder exploded");
        }
        self.calls.lock().unwrap().push(request);
        Ok(ForwardResponse {
            status: 200,
            duration: Duration::from_millis(1),
        })
    }
}

fn app_with(forwarder: Arc<RecordingForwarder>) -> Router {
    let mut config = RelayConfig::default();
    config.rules.insert(
        "owner/repo".to_string(),
        RuleConfig {
            secret: WebhookSecret::new(SECRET),
            webhook: "http://d/hook".to_string(),
            branches: vec!["^refs/heads/main$".to_string()],
        },
    );
    let rules = Arc::new(RuleStore::from_config(&config).unwrap());
    create_router(AppState::new(Relay::new(rules, forwarder)))
}

fn signed_request(uri: &str, body: impl Into<String>) -> Request<Body> {
    let body = body.into();
    let signature = compute_signature(&WebhookSecret::new(SECRET), body.as_bytes()).unwrap();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Hub-Signature", signature)
        .header("X-GitHub-Event", "push")
        .header("X-GitHub-Delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Routing
// ============================================================================

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_signed_push_is_forwarded() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let app = app_with(forwarder.clone());

        let response = app.oneshot(signed_request("/", MAIN_PUSH)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"message": "Webhook forwarded"})
        );
        assert_eq!(forwarder.call_count(), 1);
    }

    /// Path and method are not part of routing.
    #[tokio::test]
    async fn test_any_path_and_method_reaches_the_handler() {
        for (method, uri) in [("POST", "/some/deep/path"), ("PUT", "/x?y=z"), ("GET", "/")] {
            let forwarder = Arc::new(RecordingForwarder::default());
            let app = app_with(forwarder.clone());

            let mut request = signed_request(uri, MAIN_PUSH);
            *request.method_mut() = method.parse().unwrap();

            let response = app.oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK, "{method} {uri}");
            assert_eq!(forwarder.call_count(), 1, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_unlisted_branch_is_200_without_forwarding() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let app = app_with(forwarder.clone());
        let body = r#"{"repository":{"full_name":"owner/repo"},"ref":"refs/heads/feature"}"#;

        let response = app.oneshot(signed_request("/", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"message": "Your event/branch is not whitelisted"})
        );
        assert_eq!(forwarder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_header_is_400() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let app = app_with(forwarder.clone());

        let mut request = signed_request("/", MAIN_PUSH);
        request.headers_mut().remove("x-github-delivery");

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "Invalid request headers."})
        );
        assert_eq!(forwarder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_400() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let app = app_with(forwarder.clone());

        let response = app
            .oneshot(signed_request("/", "x".repeat(MAX_PAYLOAD_BYTES + 1)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "Request too large."})
        );
        assert_eq!(forwarder.call_count(), 0);
    }
}

// ============================================================================
// Body buffering
// ============================================================================

mod buffer_body_tests {
    use super::*;

    #[tokio::test]
    async fn test_body_at_limit_is_accepted() {
        let body = "x".repeat(MAX_PAYLOAD_BYTES);

        let bytes = buffer_body(Body::from(body.clone())).await.unwrap();

        assert_eq!(bytes.len(), MAX_PAYLOAD_BYTES);
        assert_eq!(bytes.as_ref(), body.as_bytes());
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let result = buffer_body(Body::from("x".repeat(MAX_PAYLOAD_BYTES + 1))).await;

        assert!(matches!(result, Err(RelayError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_empty_body_is_accepted() {
        let bytes = buffer_body(Body::empty()).await.unwrap();
        assert!(bytes.is_empty());
    }
}

// ============================================================================
// Middleware and panic handling
// ============================================================================

mod middleware_tests {
    use super::*;

    #[tokio::test]
    async fn test_incoming_correlation_id_is_echoed() {
        let app = app_with(Arc::new(RecordingForwarder::default()));
        let mut request = signed_request("/", MAIN_PUSH);
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, "abc-123".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(CORRELATION_ID_HEADER).unwrap(),
            "abc-123"
        );
    }

    #[tokio::test]
    async fn test_correlation_id_is_generated_when_absent() {
        let app = app_with(Arc::new(RecordingForwarder::default()));

        let response = app.oneshot(signed_request("/", "{")).await.unwrap();

        let generated = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(uuid::Uuid::parse_str(generated).is_ok(), "got {generated}");
    }

    /// A panicking request is answered with a 500 and the router keeps
    /// serving later requests.
    #[tokio::test]
    async fn test_panic_becomes_500_and_service_survives() {
        let panicking = Arc::new(RecordingForwarder {
            panic: true,
            ..Default::default()
        });
        let app = app_with(panicking);

        let response = app
            .clone()
            .oneshot(signed_request("/", MAIN_PUSH))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "Internal server error"})
        );

        let response = app.oneshot(signed_request("/", "{")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
