//! # Branch-Relay Core
//!
//! Core logic for the branch relay: a service that receives signed GitHub push
//! webhooks, checks them against a per-repository allowlist of branch patterns
//! and forwards the matching ones, unmodified, to a downstream webhook.
//!
//! ## Pipeline
//!
//! Every inbound request goes through the same stages and stops at the first
//! one that fails:
//!
//! 1. [`webhook::WebhookHeaders`] - required headers are present
//! 2. [`webhook::validate_payload_size`] - body is within [`MAX_PAYLOAD_BYTES`]
//! 3. [`webhook::decode_payload`] - body is JSON, routing fields extracted
//! 4. [`rules::RuleStore::lookup`] - repository has a configured rule
//! 5. [`webhook::signature::verify_signature`] - HMAC-SHA1 matches
//! 6. [`branch_filter::BranchFilter::matches`] - ref is allowlisted
//! 7. [`forwarder::Forwarder::forward`] - one-shot POST downstream
//!
//! [`relay::Relay`] drives the stages. HTTP concerns (body buffering, status
//! codes) live in the API crate.
//!
//! ## Usage
//!
//! ```rust
//! use branch_relay_core::rules::{RelayConfig, RuleStore};
//!
//! let config: RelayConfig = serde_json::from_str(
//!     r#"{"rules":{"owner/repo":{"secret":"s","webhook":"http://d/hook","branches":["^refs/heads/main$"]}}}"#,
//! )
//! .unwrap();
//! let store = RuleStore::from_config(&config).unwrap();
//! assert!(store.lookup("owner/repo").is_some());
//! ```

/// Compiled branch allowlists
pub mod branch_filter;

/// Outbound delivery of accepted events
pub mod forwarder;

/// Per-request validation and forwarding pipeline
pub mod relay;

/// Rule configuration and the repository rule store
pub mod rules;

/// Inbound webhook headers, payload decoding and signature verification
pub mod webhook;

pub use branch_filter::BranchFilter;
pub use forwarder::{ForwardError, ForwardRequest, Forwarder, HttpForwarder};
pub use relay::{Relay, RelayOutcome};
pub use rules::{RelayConfig, Rule, RuleConfig, RuleStore, RuleStoreError, WebhookSecret};
pub use webhook::{InboundEvent, RoutingFields, WebhookHeaders, MAX_PAYLOAD_BYTES};

/// The only event type that carries forwarding logic.
pub const PUSH_EVENT: &str = "push";

/// Why an event could not be routed to a rule.
///
/// All variants surface to the caller as the same generic response; the
/// distinction is kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnroutableReason {
    /// `repository.full_name` or `ref` is absent, empty, or not a string.
    MissingRoutingFields,

    /// The event type is not `push`.
    UnsupportedEventType { event_type: String },

    /// No rule is configured for the repository.
    UnknownRepository { repository: String },
}

impl std::fmt::Display for UnroutableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRoutingFields => write!(f, "payload has no repository or ref"),
            Self::UnsupportedEventType { event_type } => {
                write!(f, "event type '{}' is not forwarded", event_type)
            }
            Self::UnknownRepository { repository } => {
                write!(f, "no rule configured for repository '{}'", repository)
            }
        }
    }
}

/// Per-request failures of the relay pipeline.
///
/// Every variant is terminal for the request it occurred in. Nothing is
/// retried or queued.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// One of `x-hub-signature`, `x-github-event`, `x-github-delivery` is
    /// missing or empty. Which header was at fault is not reported.
    #[error("Invalid request headers.")]
    HeaderMissing,

    /// The buffered body is larger than [`MAX_PAYLOAD_BYTES`].
    #[error("Request too large.")]
    PayloadTooLarge { size: usize },

    /// Reading the request body failed at the transport level.
    #[error("{message}")]
    Transport { message: String },

    /// The body is not valid JSON. The message is the parser's own.
    #[error("{message}")]
    Decode { message: String },

    /// The event cannot be routed to a rule.
    #[error("Can't read json payload or target ref")]
    UnroutableEvent { reason: UnroutableReason },

    /// The supplied signature does not match the expected HMAC.
    #[error("Invalid secret.")]
    InvalidSignature,

    /// The outbound forward failed.
    #[error("{0}")]
    ForwardFailed(#[from] ForwardError),
}

impl RelayError {
    /// Short, stable name of the error kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HeaderMissing => "header_missing",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Transport { .. } => "transport_error",
            Self::Decode { .. } => "decode_error",
            Self::UnroutableEvent { .. } => "unroutable_event",
            Self::InvalidSignature => "invalid_signature",
            Self::ForwardFailed(_) => "forward_failed",
        }
    }

    /// Whether the failure is attributable to the caller's request rather than
    /// the relay or its downstream.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::HeaderMissing
            | Self::PayloadTooLarge { .. }
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::InvalidSignature => true,
            Self::UnroutableEvent { .. } | Self::ForwardFailed(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
