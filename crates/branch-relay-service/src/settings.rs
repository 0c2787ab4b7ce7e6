//! Startup configuration loading.
//!
//! Two documents are loaded, usually from the same JSON file:
//!
//! - The forwarding rules (`{"rules": {...}}`). These are parsed with
//!   `serde_json` directly so repository names keep their exact spelling.
//! - The process settings ([`ServiceConfig`]), layered with the `config`
//!   crate: the JSON document first, then `BRANCH_RELAY__*` environment
//!   variables, then the port override.

use branch_relay_api::{ConfigError, ServiceConfig};
use branch_relay_core::RelayConfig;
use std::path::{Path, PathBuf};

/// Rules file used when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Prefix of environment variables that override process settings.
pub const ENV_PREFIX: &str = "BRANCH_RELAY";

/// Where the JSON configuration document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// The document itself, from the `JSON_CONFIG` environment variable.
    Inline(String),

    /// A file. `explicit` is true when the operator named it.
    File { path: PathBuf, explicit: bool },
}

impl ConfigSource {
    /// Pick the source the way the relay always has: a non-empty inline
    /// document wins, otherwise the named file, otherwise `config.json`.
    pub fn resolve(inline: Option<String>, path: Option<PathBuf>) -> Self {
        match inline.filter(|s| !s.trim().is_empty()) {
            Some(document) => Self::Inline(document),
            None => match path {
                Some(path) => Self::File {
                    path,
                    explicit: true,
                },
                None => Self::File {
                    path: PathBuf::from(DEFAULT_CONFIG_FILE),
                    explicit: false,
                },
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Inline(_) => "JSON_CONFIG".to_string(),
            Self::File { path, .. } => path.display().to_string(),
        }
    }

    fn read(&self) -> Result<String, ConfigError> {
        match self {
            Self::Inline(document) => Ok(document.clone()),
            Self::File { path, .. } => read_file(path),
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        source_name: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Settings given on the command line, which win over every other source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub port: Option<u16>,
    pub json_logs: bool,
}

/// Load the forwarding rules. The rules document is always required.
///
/// # Errors
///
/// [`ConfigError::Unreadable`] if the file cannot be read,
/// [`ConfigError::Parsing`] if it is not a valid rules document.
pub fn load_relay_config(source: &ConfigSource) -> Result<RelayConfig, ConfigError> {
    let document = source.read()?;

    serde_json::from_str(&document).map_err(|e| ConfigError::Parsing {
        message: format!("{}: {}", source.describe(), e),
    })
}

/// Load and validate the process settings.
///
/// A missing default `config.json` is not an error here; the rules loader
/// reports it. A file the operator named must exist.
///
/// # Errors
///
/// [`ConfigError::Parsing`] if a source is malformed or a value has the
/// wrong type, [`ConfigError::Invalid`] if validation fails.
pub fn load_service_config(
    source: &ConfigSource,
    overrides: &Overrides,
) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder();

    builder = match source {
        ConfigSource::Inline(document) => {
            builder.add_source(config::File::from_str(document, config::FileFormat::Json))
        }
        ConfigSource::File { path, explicit } => builder.add_source(
            config::File::from(path.as_path())
                .format(config::FileFormat::Json)
                .required(*explicit),
        ),
    };

    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

    if let Some(port) = overrides.port {
        builder = builder
            .set_override("server.port", i64::from(port))
            .map_err(|e| ConfigError::Parsing {
                message: e.to_string(),
            })?;
    }

    if overrides.json_logs {
        builder = builder
            .set_override("logging.json_format", true)
            .map_err(|e| ConfigError::Parsing {
                message: e.to_string(),
            })?;
    }

    let mut service_config: ServiceConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;

    service_config.logging.level = service_config.logging.level.to_ascii_lowercase();
    service_config.validate()?;

    Ok(service_config)
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
