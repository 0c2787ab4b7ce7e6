//! Per-request relay pipeline.
//!
//! [`Relay::process`] takes a delivery whose headers are already validated
//! and whose body is already buffered, and runs it through decode, rule
//! lookup, signature verification, branch filtering and forwarding. The first
//! failing stage ends the request.
//!
//! Signatures are only verified for `push` events to repositories with a
//! rule. Anything else is unroutable and never touches a secret.

use crate::forwarder::{ForwardRequest, Forwarder};
use crate::rules::RuleStore;
use crate::webhook::{signature::verify_signature, InboundEvent, WebhookHeaders};
use crate::{RelayError, UnroutableReason, PUSH_EVENT};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Successful end states of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Signature valid, branch allowlisted, downstream accepted the event.
    Forwarded { status: u16 },

    /// Signature valid but no branch pattern matched. Nothing was sent.
    BranchNotAllowed,
}

/// Validation-and-forwarding pipeline shared by all requests.
///
/// Holds read-only state only, so one instance serves every request
/// concurrently.
#[derive(Clone)]
pub struct Relay {
    rules: Arc<RuleStore>,
    forwarder: Arc<dyn Forwarder>,
}

impl Relay {
    pub fn new(rules: Arc<RuleStore>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self { rules, forwarder }
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Run one buffered delivery through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the [`RelayError`] of the first failing stage.
    #[instrument(skip(self, headers, body), fields(
        event_type = %headers.event_type,
        delivery_id = %headers.delivery_id,
        body_len = body.len(),
    ))]
    pub async fn process(
        &self,
        headers: WebhookHeaders,
        body: Bytes,
    ) -> Result<RelayOutcome, RelayError> {
        let event = InboundEvent::decode(headers, body)?;

        if event.event_type() != PUSH_EVENT {
            return Err(RelayError::UnroutableEvent {
                reason: UnroutableReason::UnsupportedEventType {
                    event_type: event.event_type().to_string(),
                },
            });
        }

        let rule = self
            .rules
            .lookup(event.repository())
            .ok_or_else(|| RelayError::UnroutableEvent {
                reason: UnroutableReason::UnknownRepository {
                    repository: event.repository().to_string(),
                },
            })?;

        verify_signature(rule.secret(), &event.body, event.signature())?;

        let after = event.routing.after.as_deref().unwrap_or("-");

        if !rule.branches().matches(event.git_ref()) {
            info!(
                repository = %event.repository(),
                git_ref = %event.git_ref(),
                after = %after,
                "Skipping push event: branch is not allowlisted"
            );
            return Ok(RelayOutcome::BranchNotAllowed);
        }

        info!(
            repository = %event.repository(),
            git_ref = %event.git_ref(),
            after = %after,
            "Forwarding push event"
        );

        let request = ForwardRequest {
            url: rule.webhook().clone(),
            event_type: event.headers.event_type.clone(),
            delivery_id: event.headers.delivery_id.clone(),
            body: event.body.clone(),
        };

        match self.forwarder.forward(request).await {
            Ok(response) => Ok(RelayOutcome::Forwarded {
                status: response.status,
            }),
            Err(e) => {
                error!(
                    repository = %event.repository(),
                    git_ref = %event.git_ref(),
                    error = %e,
                    "Error while forwarding event"
                );
                Err(RelayError::ForwardFailed(e))
            }
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
