//! Common test utilities for branch-relay integration tests
//!
//! This module provides:
//! - A relay wired to a wiremock downstream
//! - Signed request builders
//! - Response decoding helpers

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use branch_relay_api::{create_router, AppState};
use branch_relay_core::{
    forwarder::ForwarderConfig, webhook::signature::compute_signature, HttpForwarder, Relay,
    RelayConfig, RuleConfig, RuleStore, WebhookSecret,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::MockServer;

pub const REPOSITORY: &str = "owner/repo";
pub const SECRET: &str = "s";
pub const HOOK_PATH: &str = "/hook";
pub const DELIVERY_ID: &str = "72d3162e-cc78-11e3-81ab-4c9367dc0958";

// ============================================================================
// Harness
// ============================================================================

/// A relay whose single rule forwards `owner/repo` pushes on `main` to a
/// mock downstream.
pub struct TestRelay {
    pub downstream: MockServer,
    pub relay: Relay,
}

impl TestRelay {
    pub async fn start() -> Self {
        Self::start_with_branches(&["^refs/heads/main$"]).await
    }

    pub async fn start_with_branches(branches: &[&str]) -> Self {
        let downstream = MockServer::start().await;

        let mut config = RelayConfig::default();
        config.rules.insert(
            REPOSITORY.to_string(),
            RuleConfig {
                secret: WebhookSecret::new(SECRET),
                webhook: format!("{}{}", downstream.uri(), HOOK_PATH),
                branches: branches.iter().map(|b| b.to_string()).collect(),
            },
        );
        let rules = RuleStore::from_config(&config).expect("test rules are valid");

        let forwarder = HttpForwarder::new(ForwarderConfig {
            timeout: Duration::from_secs(2),
            ..ForwarderConfig::default()
        })
        .expect("client should build");

        Self {
            downstream,
            relay: Relay::new(Arc::new(rules), Arc::new(forwarder)),
        }
    }

    pub fn router(&self) -> Router {
        create_router(AppState::new(self.relay.clone()))
    }

    /// Send one request through a fresh router.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        (
            status,
            serde_json::from_slice(&bytes).expect("response body is JSON"),
        )
    }

    pub async fn downstream_calls(&self) -> usize {
        self.downstream
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

// ============================================================================
// Request builders
// ============================================================================

pub fn push_payload(repository: &str, git_ref: &str) -> String {
    serde_json::json!({
        "ref": git_ref,
        "after": "0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c",
        "repository": { "full_name": repository, "private": false },
        "pusher": { "name": "octocat" }
    })
    .to_string()
}

pub fn sign(body: &[u8]) -> String {
    compute_signature(&WebhookSecret::new(SECRET), body).expect("HMAC accepts any key length")
}

/// A delivery with all three headers set.
pub fn webhook_request(event_type: &str, signature: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("x-hub-signature", signature)
        .header("x-github-event", event_type)
        .header("x-github-delivery", DELIVERY_ID)
        .body(body.into())
        .expect("request should build")
}

/// A correctly signed push delivery.
pub fn signed_push(body: &str) -> Request<Body> {
    webhook_request("push", &sign(body.as_bytes()), body.to_string())
}
