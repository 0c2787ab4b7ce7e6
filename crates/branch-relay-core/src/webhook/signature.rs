//! HMAC-SHA1 webhook signature verification.
//!
//! GitHub signs each delivery with `X-Hub-Signature: sha1=<hex>`, the
//! HMAC-SHA1 of the raw body keyed by the repository's webhook secret. The
//! relay recomputes that value and compares the two strings in constant time.
//!
//! # Security
//!
//! - The comparison never short-circuits on the first differing byte.
//! - Inputs of different length are rejected without scanning either one.
//! - Neither the secret nor the computed digest is logged or returned.

use crate::rules::WebhookSecret;
use crate::RelayError;
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

type HmacSha1 = Hmac<Sha1>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha1=";

/// Compute `sha1=<lowercase hex>` for `payload` keyed by `secret`.
pub fn compute_signature(secret: &WebhookSecret, payload: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha1::new_from_slice(secret.expose_bytes())?;
    mac.update(payload);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a supplied `X-Hub-Signature` value against the raw payload.
///
/// # Errors
///
/// Returns [`RelayError::InvalidSignature`] for any mismatch, including a
/// malformed header value.
#[instrument(skip_all, fields(payload_len = payload.len(), sig_len = supplied.len()))]
pub fn verify_signature(
    secret: &WebhookSecret,
    payload: &[u8],
    supplied: &str,
) -> Result<(), RelayError> {
    let expected = compute_signature(secret, payload).map_err(|_| RelayError::InvalidSignature)?;

    if constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
        Ok(())
    } else {
        debug!("Signature mismatch");
        Err(RelayError::InvalidSignature)
    }
}

/// Compare two byte strings without data-dependent early exit.
///
/// A length mismatch returns `false` immediately; lengths are not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
