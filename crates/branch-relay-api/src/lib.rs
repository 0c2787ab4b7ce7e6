//! # Branch-Relay HTTP Service
//!
//! HTTP surface of the branch relay. Every request, whatever its method or
//! path, is treated as a GitHub webhook delivery:
//!
//! 1. Required headers are checked before any of the body is read
//! 2. The body is buffered up to [`MAX_PAYLOAD_BYTES`]
//! 3. The buffered delivery runs through [`Relay::process`]
//! 4. The outcome becomes a `{"message": ...}` or `{"error": ...}` JSON body
//!
//! A panic while handling one request is logged and answered with a 500; the
//! server keeps serving.

pub mod config;
pub mod errors;
pub mod responses;

pub use config::{ConfigError, LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ServiceError, WebhookHandlerError};
pub use responses::{ErrorResponse, MessageResponse};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    Router,
};
use branch_relay_core::{Relay, RelayError, WebhookHeaders, MAX_PAYLOAD_BYTES};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::{
    any::Any,
    collections::HashMap,
    future::{Future, IntoFuture},
    time::Duration,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

/// Header used to correlate a request with its log lines.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: Relay,
}

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create the HTTP router. A single fallback handler serves every path.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_webhook)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Bind the configured address and serve until SIGINT or SIGTERM.
pub async fn start_server(config: ServiceConfig, relay: Relay) -> Result<(), ServiceError> {
    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    let local_address = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or(address);

    info!(
        address = %local_address,
        rules = relay.rules().len(),
        "Starting HTTP server"
    );

    serve(
        listener,
        AppState::new(relay),
        config.server.shutdown_timeout(),
        shutdown_signal(),
    )
    .await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// After `shutdown` resolves no new connections are accepted. In-flight
/// requests get `shutdown_timeout` to finish before they are dropped.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown_timeout: Duration,
    shutdown: F,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();

    let graceful = async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();

    let deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?,
        _ = deadline => warn!(
            timeout_seconds = shutdown_timeout.as_secs(),
            "Graceful shutdown timed out, dropping in-flight requests"
        ),
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// If a handler cannot be installed the failure is logged and that signal
/// is ignored.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Webhook Handler
// ============================================================================

/// Handle one webhook delivery.
///
/// Headers are checked first so a request without them is rejected without
/// reading its body.
#[instrument(skip_all)]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<MessageResponse>, WebhookHandlerError> {
    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect();

    let webhook_headers = WebhookHeaders::from_http_headers(&header_map)?;

    let body = buffer_body(body).await?;

    let outcome = state.relay.process(webhook_headers, body).await?;

    Ok(Json(MessageResponse::from(outcome)))
}

/// Read the whole body, refusing to hold more than [`MAX_PAYLOAD_BYTES`].
///
/// # Errors
///
/// [`RelayError::PayloadTooLarge`] once the limit is crossed, or
/// [`RelayError::Transport`] if the connection fails mid-body.
pub async fn buffer_body(body: Body) -> Result<Bytes, RelayError> {
    match Limited::new(body, MAX_PAYLOAD_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(RelayError::PayloadTooLarge {
                size: MAX_PAYLOAD_BYTES + 1,
            })
        }
        Err(e) => Err(RelayError::Transport {
            message: e.to_string(),
        }),
    }
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    error!(panic = %detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Reuses an incoming `x-correlation-id` or generates one, logs request start
/// and completion, and echoes the id on the response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!(
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
