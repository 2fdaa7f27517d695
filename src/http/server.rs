//! Relay server.
//!
//! # Responsibilities
//! - Accept any method on any path and forward it to the configured target
//! - Pick the transport from the inbound routing headers
//! - Map local failures (open circuit, timeout, bad certificate) to gateway statuses
//!
//! # Design Decisions
//! - Inbound bodies are buffered up to `max_body_bytes` so retries replay them
//! - Upstream responses, error statuses included, are relayed unchanged
//! - Routing headers are stripped before forwarding unless configured otherwise

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ListenerConfig;
use crate::error::ApiError;
use crate::http::forwarder::RequestForwarder;
use crate::http::request::{request_id, OutboundRequest, RequestIdLayer, X_REQUEST_ID};
use crate::observability::metrics;
use crate::routing::classify_route;

/// Slack on top of the call timeout before the server gives up on a handler.
const HANDLER_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// State injected into the relay handler.
#[derive(Clone)]
pub struct RelayState {
    pub forwarder: Arc<RequestForwarder>,
    pub forward_routing_headers: bool,
    pub max_body_bytes: usize,
}

/// HTTP front end that relays calls through a [`RequestForwarder`].
pub struct RelayServer {
    router: Router,
}

impl RelayServer {
    pub fn new(forwarder: Arc<RequestForwarder>, config: &ListenerConfig) -> Self {
        let handler_timeout = forwarder
            .call_deadline()
            .limit()
            .unwrap_or_default()
            + HANDLER_TIMEOUT_SLACK;
        let state = RelayState {
            forwarder,
            forward_routing_headers: config.forward_routing_headers,
            max_body_bytes: config.max_body_bytes,
        };
        Self {
            router: Self::build_router(state, handler_timeout),
        }
    }

    #[allow(deprecated)]
    fn build_router(state: RelayState, handler_timeout: Duration) -> Router {
        let max_body_bytes = state.max_body_bytes;
        Router::new()
            .route("/{*path}", any(relay_handler))
            .route("/", any(relay_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_bytes))
            .layer(TimeoutLayer::new(handler_timeout))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Relay server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: std::net::SocketAddr,
        tls: axum_server::tls_rustls::RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let handle = axum_server::Handle::new();
        let trigger = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            trigger.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        tracing::info!(address = %addr, "Relay server starting (TLS)");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

async fn relay_handler(State(state): State<RelayState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let request_id = request_id(request.headers()).unwrap_or("unknown").to_string();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            metrics::record_call(&method, 413, "relay", start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large or unreadable")
                .into_response();
        }
    };

    let target = match state.forwarder.ensure_configured() {
        Ok(target) => target,
        Err(e) => return failure(&request_id, &method, e, start),
    };

    let route = classify_route(&parts.headers, state.forwarder.certificate_defaults());
    let mut outbound = OutboundRequest::from_inbound(&parts, body, &target);
    if !state.forward_routing_headers {
        outbound.strip_routing_headers();
    }
    let endpoint = outbound.endpoint();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        endpoint = %endpoint,
        "Relaying request"
    );

    match state
        .forwarder
        .dispatch(&outbound, &route, &endpoint, state.forwarder.call_deadline())
        .await
    {
        Ok(upstream) => {
            metrics::record_call(&method, upstream.status.as_u16(), "relay", start);
            let mut response = upstream.into_response();
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(X_REQUEST_ID, value);
            }
            response
        }
        Err(e) => failure(&request_id, &method, e, start),
    }
}

fn failure(request_id: &str, method: &str, err: ApiError, start: Instant) -> Response {
    let response = error_response(&err);
    tracing::warn!(
        request_id = %request_id,
        status = response.status().as_u16(),
        error = %err,
        "Relay call failed"
    );
    metrics::record_call(method, response.status().as_u16(), "relay", start);
    response
}

/// Gateway response for a call that produced no upstream response.
pub fn error_response(err: &ApiError) -> Response {
    let status = gateway_status(err);
    let mut response = (status, err.to_string()).into_response();
    if let ApiError::CircuitOpen { retry_after, .. } = err {
        let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

fn gateway_status(err: &ApiError) -> StatusCode {
    match err {
        ApiError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ApiError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ApiError::CertificateMismatch { .. } => StatusCode::FORBIDDEN,
        e if e.is_certificate_error() => StatusCode::BAD_GATEWAY,
        ApiError::InvalidEndpoint { .. } | ApiError::InvalidHeader { .. } | ApiError::Encode(_) => {
            StatusCode::BAD_REQUEST
        }
        ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::Transport { .. } | ApiError::Decode { .. } => StatusCode::BAD_GATEWAY,
        other => other
            .status()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY),
    }
}
