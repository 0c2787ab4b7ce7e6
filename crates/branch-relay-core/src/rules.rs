//! # Rule Store
//!
//! Per-repository forwarding rules, built once at startup from configuration
//! and read concurrently by every request afterwards.
//!
//! Construction validates everything that can be validated up front: secrets
//! must be non-empty, webhook targets must be absolute URLs, and every branch
//! pattern must compile. A configuration that fails any of these checks is
//! fatal; the service must not start serving with it.

use crate::branch_filter::BranchFilter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::info;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Configuration
// ============================================================================

/// Relay configuration: rules keyed by repository full name (`owner/repo`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,
}

/// Forwarding rule for one repository, as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Shared HMAC key used by the source-control host to sign deliveries.
    pub secret: WebhookSecret,

    /// Downstream webhook that receives accepted events.
    pub webhook: String,

    /// Regular expressions matched against the pushed ref.
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Webhook signing secret.
///
/// Zeroed on drop and redacted in `Debug` and `Serialize` output.
#[derive(Clone, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw secret bytes, for HMAC keying only.
    pub fn expose_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<REDACTED>)")
    }
}

impl Serialize for WebhookSecret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("<REDACTED>")
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Validated, compiled forwarding rule.
#[derive(Clone)]
pub struct Rule {
    secret: WebhookSecret,
    webhook: Url,
    branches: BranchFilter,
}

impl Rule {
    /// Validate and compile a rule for `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleStoreError`] when the secret is empty, the webhook is not
    /// an absolute URL, the branch list is empty, or a pattern fails to
    /// compile.
    pub fn from_config(repository: &str, config: &RuleConfig) -> Result<Self, RuleStoreError> {
        if config.secret.is_empty() {
            return Err(RuleStoreError::EmptySecret {
                repository: repository.to_string(),
            });
        }

        let webhook = Url::parse(&config.webhook).map_err(|e| RuleStoreError::InvalidWebhook {
            repository: repository.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(webhook.scheme(), "http" | "https") {
            return Err(RuleStoreError::InvalidWebhook {
                repository: repository.to_string(),
                message: format!("unsupported scheme '{}'", webhook.scheme()),
            });
        }

        if config.branches.is_empty() {
            return Err(RuleStoreError::NoBranchPatterns {
                repository: repository.to_string(),
            });
        }

        let branches = BranchFilter::compile(&config.branches).map_err(|(pattern, e)| {
            RuleStoreError::InvalidBranchPattern {
                repository: repository.to_string(),
                pattern,
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            secret: config.secret.clone(),
            webhook,
            branches,
        })
    }

    pub fn secret(&self) -> &WebhookSecret {
        &self.secret
    }

    pub fn webhook(&self) -> &Url {
        &self.webhook
    }

    pub fn branches(&self) -> &BranchFilter {
        &self.branches
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("secret", &"<REDACTED>")
            .field("webhook", &self.webhook.as_str())
            .field("branches", &self.branches.patterns().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Rule Store
// ============================================================================

/// Immutable mapping from repository full name to [`Rule`].
///
/// Built once; lookups are plain reads and safe to share across tasks
/// without locking.
#[derive(Debug, Clone)]
pub struct RuleStore {
    rules: HashMap<String, Rule>,
}

impl RuleStore {
    /// Build the store from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleStoreError::NoRules`] for an empty configuration, or the
    /// first per-rule validation failure.
    pub fn from_config(config: &RelayConfig) -> Result<Self, RuleStoreError> {
        if config.rules.is_empty() {
            return Err(RuleStoreError::NoRules);
        }

        let mut rules = HashMap::with_capacity(config.rules.len());
        for (repository, rule_config) in &config.rules {
            if repository.is_empty() {
                return Err(RuleStoreError::EmptyRepositoryName);
            }

            let rule = Rule::from_config(repository, rule_config)?;
            info!(
                repository = %repository,
                webhook_host = rule.webhook().host_str().unwrap_or_default(),
                branch_patterns = rule.branches().len(),
                "Loaded forwarding rule"
            );
            rules.insert(repository.clone(), rule);
        }

        Ok(Self { rules })
    }

    /// Rule for `repository`, if one is configured.
    pub fn lookup(&self, repository: &str) -> Option<&Rule> {
        self.rules.get(repository)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Configured repository names, in no particular order.
    pub fn repositories(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Startup-fatal rule configuration problems.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleStoreError {
    #[error("No forwarding rules configured")]
    NoRules,

    #[error("Rule has an empty repository name")]
    EmptyRepositoryName,

    #[error("Rule for '{repository}' has an empty secret")]
    EmptySecret { repository: String },

    #[error("Rule for '{repository}' has an invalid webhook URL: {message}")]
    InvalidWebhook { repository: String, message: String },

    #[error("Rule for '{repository}' has no branch patterns")]
    NoBranchPatterns { repository: String },

    #[error("Rule for '{repository}' has an invalid branch pattern '{pattern}': {message}")]
    InvalidBranchPattern {
        repository: String,
        pattern: String,
        message: String,
    },
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
