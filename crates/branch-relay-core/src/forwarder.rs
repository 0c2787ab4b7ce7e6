//! Outbound delivery of accepted push events.
//!
//! Each accepted event is POSTed exactly once to its rule's webhook. There is
//! no retry and no persistence: a failed forward is reported to the original
//! caller and then forgotten. The original body bytes are sent unchanged,
//! together with the event type and delivery id. The signature header is not
//! forwarded. Redirects are not followed; a 3xx fails like any other non-2xx
//! status.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument};
use url::Url;

use crate::webhook::{DELIVERY_HEADER, EVENT_HEADER};

/// Settings for [`HttpForwarder`].
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Upper bound on one outbound request, connect to last body byte.
    pub timeout: Duration,

    /// `User-Agent` sent downstream.
    pub user_agent: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            user_agent: format!("branch-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One outbound delivery.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub url: Url,
    pub event_type: String,
    pub delivery_id: String,
    pub body: Bytes,
}

/// Successful downstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: u16,
    pub duration: Duration,
}

/// Why an outbound delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("Downstream responded with {status} {reason}")]
    DownstreamStatus { status: u16, reason: String },

    #[error("Downstream did not respond within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Could not reach downstream: {message}")]
    Network { message: String },

    #[error("Failed to build HTTP client: {message}")]
    Configuration { message: String },
}

/// Delivers accepted events downstream.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// POST the event once. Any non-2xx status is a failure.
    async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, ForwardError>;
}

/// [`Forwarder`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    config: ForwarderConfig,
}

impl HttpForwarder {
    /// # Errors
    ///
    /// Returns [`ForwardError::Configuration`] if the client cannot be built.
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ForwardError::Configuration {
                message: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self, ForwardError> {
        Self::new(ForwarderConfig::default())
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    fn categorize(&self, error: reqwest::Error) -> ForwardError {
        if error.is_timeout() {
            ForwardError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else {
            ForwardError::Network {
                message: error.without_url().to_string(),
            }
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, ForwardError> {
        let span = info_span!(
            "forward",
            delivery_id = %request.delivery_id,
            event_type = %request.event_type,
            host = request.url.host_str().unwrap_or_default(),
        );

        async move {
            let start = Instant::now();

            let response = self
                .client
                .post(request.url)
                .header(CONTENT_TYPE, "application/json")
                .header(EVENT_HEADER, request.event_type)
                .header(DELIVERY_HEADER, request.delivery_id)
                .body(request.body)
                .send()
                .await
                .map_err(|e| self.categorize(e))?;

            let status = response.status();
            let duration = start.elapsed();
            debug!(status = status.as_u16(), duration_ms = duration.as_millis() as u64, "Downstream responded");

            if !status.is_success() {
                return Err(ForwardError::DownstreamStatus {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                });
            }

            Ok(ForwardResponse {
                status: status.as_u16(),
                duration,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "forwarder_tests.rs"]
mod tests;
