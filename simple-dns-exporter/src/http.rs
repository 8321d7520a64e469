//! HTTP server for the probe endpoint.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::Router;
use axum::extract::{Form, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use dns_probe::{EphemeralCollector, ProbeContext, SharedProber};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Content type produced by the `prometheus-client` text encoder.
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Port applied when the `server` parameter has none.
const DEFAULT_DNS_PORT: u16 = 53;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    prober: SharedProber,
    query_timeout: Duration,
    shutdown: CancellationToken,
}

/// Probe request parameters.
#[derive(Debug, Default, Deserialize)]
struct ProbeParams {
    target: Option<String>,
    server: Option<String>,
}

impl ProbeParams {
    /// Fill the fields missing from `self` from `fallback`.
    fn or(self, fallback: ProbeParams) -> Self {
        Self {
            target: self.target.or(fallback.target),
            server: self.server.or(fallback.server),
        }
    }
}

/// Create the HTTP router.
fn create_router(state: AppState, probe_path: &str) -> Router {
    Router::new()
        .route(probe_path, get(probe_handler).post(probe_form_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for `GET /probe?target=..&server=..`.
async fn probe_handler(
    State(state): State<AppState>,
    Query(params): Query<ProbeParams>,
) -> Response {
    run_probe(&state, params).await
}

/// Handler for `POST /probe`.
///
/// Reads both the query string and a form-encoded body; body values win.
async fn probe_form_handler(
    State(state): State<AppState>,
    Query(query): Query<ProbeParams>,
    form: Option<Form<ProbeParams>>,
) -> Response {
    let params = match form {
        Some(Form(body)) => body.or(query),
        None => query,
    };
    run_probe(&state, params).await
}

async fn run_probe(state: &AppState, params: ProbeParams) -> Response {
    let Some(target) = params.target.filter(|t| !t.is_empty()) else {
        debug!("Request had empty target");
        return bad_request();
    };
    let Some(server) = params.server.filter(|s| !s.is_empty()) else {
        debug!("Request had empty server");
        return bad_request();
    };
    let server = with_default_port(&server);

    let ctx = ProbeContext::with_timeout(state.query_timeout)
        .with_cancellation(state.shutdown.child_token());
    let metrics = state.prober.probe(&target, &server, &ctx).await;

    match EphemeralCollector::new(metrics).encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE),
                // One probe per connection.
                (header::CONNECTION, "close"),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(
                instance = %target,
                server = %server,
                error = %e,
                "Failed to encode metrics"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "OK\n").into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request\n").into_response()
}

/// Append the default DNS port unless the server already carries one.
fn with_default_port(server: &str) -> String {
    if let Ok(IpAddr::V6(ip)) = server.parse::<IpAddr>() {
        return SocketAddr::new(IpAddr::V6(ip), DEFAULT_DNS_PORT).to_string();
    }
    if server.contains(':') {
        server.to_string()
    } else {
        format!("{}:{}", server, DEFAULT_DNS_PORT)
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    prober: SharedProber,
    listen_addr: SocketAddr,
    query_timeout: Duration,
    probe_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        prober: SharedProber,
        listen_addr: SocketAddr,
        query_timeout: Duration,
        probe_path: String,
    ) -> Self {
        Self {
            prober,
            listen_addr,
            query_timeout,
            probe_path,
        }
    }

    /// Run the HTTP server until `shutdown` is cancelled.
    ///
    /// Cancelling `shutdown` also cancels probes still in flight.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = AppState {
            prober: self.prober,
            query_timeout: self.query_timeout,
            shutdown: shutdown.clone(),
        };
        let router = create_router(state, &self.probe_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.probe_path,
            query_timeout_ms = self.query_timeout.as_millis() as u64,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
