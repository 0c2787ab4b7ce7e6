//! JSON bodies returned to webhook senders.

use branch_relay_core::RelayOutcome;
use serde::{Deserialize, Serialize};

pub const FORWARDED_MESSAGE: &str = "Webhook forwarded";
pub const NOT_ALLOWLISTED_MESSAGE: &str = "Your event/branch is not whitelisted";

/// `{"message": ...}` body of a 200 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl From<RelayOutcome> for MessageResponse {
    fn from(outcome: RelayOutcome) -> Self {
        let message = match outcome {
            RelayOutcome::Forwarded { .. } => FORWARDED_MESSAGE,
            RelayOutcome::BranchNotAllowed => NOT_ALLOWLISTED_MESSAGE,
        };
        Self {
            message: message.to_string(),
        }
    }
}

/// `{"error": ...}` body of a 400 or 500 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
