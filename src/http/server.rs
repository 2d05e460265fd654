//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: status endpoints plus a catch-all proxy handler
//! - Wire up middleware (request ID, tracing, body limit)
//! - Buffer inbound bodies and hand them to the dispatcher
//! - Relay the final upstream response, or answer 502
//! - Flush failover state once the server has drained

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, Uri},
    response::Response,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ConfigError, ProxyConfig};
use crate::dispatch::{error_chain, Dispatcher, InboundRequest};
use crate::failover::{FailoverMachine, StateStore};
use crate::http::request::{request_id, ProxyRequestId};
use crate::http::response::{bad_gateway, relay};
use crate::http::status::{BrainStatus, HealthReport};
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub failover: Arc<FailoverMachine>,
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the failover proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Build upstreams, outbound clients and the failover machine from
    /// `config`. Loads persisted state from disk.
    pub fn new(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let dispatcher = Dispatcher::from_config(config)?;
        let failover = FailoverMachine::new(
            StateStore::new(&config.failover.state_file),
            dispatcher.upstreams().backup_enabled(),
            Duration::from_millis(config.failover.cooldown_ms),
        );

        Ok(Self::from_parts(
            Arc::new(failover),
            Arc::new(dispatcher),
            config.listener.max_body_bytes,
        ))
    }

    pub fn from_parts(
        failover: Arc<FailoverMachine>,
        dispatcher: Arc<Dispatcher>,
        max_body_bytes: usize,
    ) -> Self {
        let state = AppState {
            failover,
            dispatcher,
        };
        let router = Self::build_router(state.clone(), max_body_bytes);
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, max_body_bytes: usize) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(ProxyRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id());

        // Non-GET requests to the status paths are proxied like any other.
        Router::new()
            .route("/health", get(health).fallback(proxy_handler))
            .route("/healthz", get(health).fallback(proxy_handler))
            .route("/brain-status", get(brain_status).fallback(proxy_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .layer(middleware)
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn failover(&self) -> &Arc<FailoverMachine> {
        &self.state.failover
    }

    /// Whether outbound calls may go through the configured relay.
    pub fn relay_enabled(&self) -> bool {
        self.state.dispatcher.clients().relay_enabled()
    }

    /// Serve until `shutdown` fires, then drain and persist state.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        self.state.failover.flush();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let snapshot = state.failover.snapshot();
    Json(HealthReport::new(&snapshot, state.failover.backup_enabled()))
}

async fn brain_status(State(state): State<AppState>) -> Json<BrainStatus> {
    let snapshot = state.failover.snapshot();
    let backup_model = state
        .dispatcher
        .upstreams()
        .backup()
        .and_then(|backup| backup.model_override.clone());
    let cooldown_ms = u64::try_from(state.failover.cooldown().as_millis()).unwrap_or(u64::MAX);
    Json(BrainStatus::new(&snapshot, backup_model, cooldown_ms))
}

/// Main proxy handler.
/// Picks the active upstream once, then lets the dispatcher fail over.
async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start_time = Instant::now();
    let target = state.failover.select_target();

    let inbound = InboundRequest {
        method,
        path_and_query: uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        request_id: request_id(&headers),
        headers,
        body,
    };

    tracing::debug!(
        request_id = %inbound.request_id,
        method = %inbound.method,
        path = %inbound.path_and_query,
        target = %target,
        body_bytes = inbound.body.len(),
        "Proxying request"
    );

    let dispatched = state.dispatcher.dispatch(&state.failover, &inbound, target).await;

    match dispatched.outcome {
        Ok(response) => {
            metrics::record_request(dispatched.upstream, response.status().as_u16(), start_time);
            relay(response, dispatched.upstream, &inbound.request_id)
        }
        Err(e) => {
            let message = error_chain(&e);
            tracing::error!(
                request_id = %inbound.request_id,
                upstream = %dispatched.upstream,
                retry = dispatched.attempt.is_retry(),
                error = %message,
                "Request failed on every available upstream"
            );
            metrics::record_request(dispatched.upstream, 502, start_time);
            bad_gateway(&message)
        }
    }
}
