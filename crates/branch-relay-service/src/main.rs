//! # Branch-Relay Service
//!
//! Binary entry point for the branch relay.
//!
//! This executable:
//! - Loads the forwarding rules and process settings
//! - Initializes structured logging
//! - Builds the rule store and the outbound HTTP forwarder
//! - Starts the HTTP server from branch-relay-api
//!
//! Exit codes: 1 when the address cannot be bound, 2 when the server fails
//! while running, 3 for any configuration problem.

mod settings;

use branch_relay_api::{start_server, ConfigError, LoggingConfig, ServiceConfig, ServiceError};
use branch_relay_core::{
    forwarder::ForwarderConfig, HttpForwarder, Relay, RelayConfig, RuleStore,
};
use clap::Parser;
use settings::{ConfigSource, Overrides};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relay allowlisted GitHub push webhooks to downstream endpoints.
#[derive(Debug, Parser)]
#[command(name = "branch-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay allowlisted GitHub push webhooks to downstream endpoints")]
struct Cli {
    /// Configuration file path (defaults to ./config.json)
    #[arg(short, long, env = "BRANCH_RELAY_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Inline JSON configuration document; takes precedence over the file
    #[arg(long, env = "JSON_CONFIG", hide_env_values = true)]
    json_config: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let source = ConfigSource::resolve(cli.json_config, cli.config);
    let overrides = Overrides {
        port: cli.port,
        json_logs: cli.json_logs,
    };

    // Settings are loaded before logging exists so the configured format
    // applies from the first line. Failures are reported once logging is up.
    let loaded = settings::load_service_config(&source, &overrides);

    let logging = match &loaded {
        Ok(service_config) => service_config.logging.clone(),
        Err(_) => LoggingConfig {
            json_format: cli.json_logs,
            ..LoggingConfig::default()
        },
    };
    init_logging(&logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %source.describe(),
        "Starting Branch-Relay Service"
    );

    let service_config = match loaded {
        Ok(service_config) => service_config,
        Err(e) => exit_with(ServiceError::Configuration(e)),
    };

    let relay = match settings::load_relay_config(&source)
        .and_then(|relay_config| build_relay(&relay_config, &service_config))
    {
        Ok(relay) => relay,
        Err(e) => exit_with(ServiceError::Configuration(e)),
    };

    if let Err(e) = start_server(service_config, relay).await {
        exit_with(e);
    }
}

// ============================================================================
// Private helpers
// ============================================================================

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "branch_relay_service={level},branch_relay_api={level},branch_relay_core={level},tower_http={level}",
            level = logging.level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Compile the rules and build the forwarding pipeline. Any invalid rule
/// aborts startup.
fn build_relay(
    relay_config: &RelayConfig,
    service_config: &ServiceConfig,
) -> Result<Relay, ConfigError> {
    let rules = RuleStore::from_config(relay_config).map_err(|e| ConfigError::Invalid {
        message: e.to_string(),
    })?;

    let forwarder = HttpForwarder::new(ForwarderConfig {
        timeout: service_config.server.forward_timeout(),
        ..ForwarderConfig::default()
    })
    .map_err(|e| ConfigError::Invalid {
        message: e.to_string(),
    })?;

    info!(
        rules = rules.len(),
        forward_timeout_seconds = service_config.server.forward_timeout_seconds,
        "Forwarding rules loaded"
    );

    Ok(Relay::new(Arc::new(rules), Arc::new(forwarder)))
}

fn exit_with(e: ServiceError) -> ! {
    error!(error = %e, "Branch-Relay Service stopped");
    std::process::exit(e.exit_code());
}
