//! # Webhook Intake
//!
//! Header validation, size admission and payload decoding for inbound
//! GitHub deliveries.
//!
//! Checks run cheapest first. Headers are validated before the body is read,
//! the body size is checked before any parsing, and the payload is only
//! decoded far enough to extract the routing fields. The raw bytes are kept
//! untouched so the signature can be verified over exactly what was received
//! and the same bytes can be forwarded.

use crate::{RelayError, UnroutableReason};
use bytes::Bytes;
use std::collections::HashMap;

pub mod signature;

/// Header carrying `sha1=<hex>` HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Header carrying the event type, e.g. `push`.
pub const EVENT_HEADER: &str = "x-github-event";

/// Header carrying the unique delivery identifier.
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Largest accepted request body, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 30_720;

// ============================================================================
// Headers
// ============================================================================

/// The three headers every delivery must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub signature: String,   // X-Hub-Signature
    pub event_type: String,  // X-GitHub-Event
    pub delivery_id: String, // X-GitHub-Delivery
}

impl WebhookHeaders {
    /// Extract the required headers from a header map.
    ///
    /// Header names are compared case-insensitively. A header that is present
    /// but empty counts as missing.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HeaderMissing`] without saying which header was
    /// at fault.
    pub fn from_http_headers(headers: &HashMap<String, String>) -> Result<Self, RelayError> {
        let get = |name: &str| -> Result<String, RelayError> {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(RelayError::HeaderMissing)
        };

        Ok(Self {
            signature: get(SIGNATURE_HEADER)?,
            event_type: get(EVENT_HEADER)?,
            delivery_id: get(DELIVERY_HEADER)?,
        })
    }
}

// ============================================================================
// Body admission and decoding
// ============================================================================

/// Reject bodies larger than [`MAX_PAYLOAD_BYTES`].
pub fn validate_payload_size(size: usize) -> Result<(), RelayError> {
    if size > MAX_PAYLOAD_BYTES {
        return Err(RelayError::PayloadTooLarge { size });
    }
    Ok(())
}

/// Parse the raw body as JSON.
///
/// # Errors
///
/// Returns [`RelayError::Decode`] with the parser's message.
pub fn decode_payload(body: &[u8]) -> Result<serde_json::Value, RelayError> {
    serde_json::from_slice(body).map_err(|e| RelayError::Decode {
        message: e.to_string(),
    })
}

/// The payload fields needed to route a push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingFields {
    /// `repository.full_name`, e.g. `owner/repo`.
    pub repository: String,

    /// `ref`, e.g. `refs/heads/main`.
    pub git_ref: String,

    /// `after`, the new head commit. Only used for logging.
    pub after: Option<String>,
}

impl RoutingFields {
    /// Extract routing fields from a decoded payload.
    ///
    /// Returns `None` when the payload is not an object, or when either
    /// `repository.full_name` or `ref` is missing, empty or not a string.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        let non_empty_str = |v: Option<&serde_json::Value>| {
            v.and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let git_ref = non_empty_str(payload.get("ref"))?;
        let repository =
            non_empty_str(payload.get("repository").and_then(|r| r.get("full_name")))?;
        let after = non_empty_str(payload.get("after"));

        Some(Self {
            repository,
            git_ref,
            after,
        })
    }
}

// ============================================================================
// Inbound event
// ============================================================================

/// A delivery that passed header, size and decode checks and carries routing
/// fields. Lives for one request only.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub headers: WebhookHeaders,
    pub body: Bytes,
    pub routing: RoutingFields,
}

impl InboundEvent {
    /// Admit and decode a buffered delivery.
    ///
    /// # Errors
    ///
    /// - [`RelayError::PayloadTooLarge`] before any parsing is attempted
    /// - [`RelayError::Decode`] for malformed JSON
    /// - [`RelayError::UnroutableEvent`] when routing fields are missing
    pub fn decode(headers: WebhookHeaders, body: Bytes) -> Result<Self, RelayError> {
        validate_payload_size(body.len())?;

        let payload = decode_payload(&body)?;
        let routing =
            RoutingFields::from_payload(&payload).ok_or(RelayError::UnroutableEvent {
                reason: UnroutableReason::MissingRoutingFields,
            })?;

        Ok(Self {
            headers,
            body,
            routing,
        })
    }

    pub fn event_type(&self) -> &str {
        &self.headers.event_type
    }

    pub fn delivery_id(&self) -> &str {
        &self.headers.delivery_id
    }

    pub fn signature(&self) -> &str {
        &self.headers.signature
    }

    pub fn repository(&self) -> &str {
        &self.routing.repository
    }

    pub fn git_ref(&self) -> &str {
        &self.routing.git_ref
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
