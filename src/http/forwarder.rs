//! Request forwarder.
//!
//! # Responsibilities
//! - Resolve the configured target once, lazily
//! - Pick the default or a certificate-bound transport per call
//! - Run every dispatch through the resilience pipeline
//! - Classify the terminal response into a payload or an [`ApiError`]
//!
//! # Design Decisions
//! - The target is set at most once; `reset` clears it and the next call
//!   picks up the current base domain
//! - Routing headers select the transport and are never sent upstream
//! - Breakers are keyed by identity and host so one failing tenant cannot
//!   open the circuit for another

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::certificates::{CertificateStore, Identity};
use crate::clients::{load_root_certificates, BoundClientRegistry};
use crate::config::{CertificateConfig, ClientConfig, RelayConfig};
use crate::error::{ApiError, ApiResult};
use crate::http::request::OutboundRequest;
use crate::http::response::{
    classify_download, classify_reply, json_content_type, BufferedResponse, Download, Reply,
};
use crate::observability::metrics;
use crate::resilience::{CircuitState, Deadline, PolicyContext, PolicyError, ResiliencePipeline};
use crate::routing::matcher::is_routing_header;
use crate::routing::{classify_route, RouteDecision};

const DEFAULT_BREAKER_IDENTITY: &str = "default";

/// Shared state behind a forwarder. Injected so tests and the relay can share it.
#[derive(Debug, Clone)]
pub struct Components {
    pub certificates: Arc<CertificateStore>,
    pub clients: Arc<BoundClientRegistry>,
    pub pipeline: Arc<ResiliencePipeline>,
}

impl Components {
    pub fn new(policy: PolicyContext) -> ApiResult<Self> {
        Self::with_root_certificates(policy, Vec::new())
    }

    /// Components whose transports also trust `roots`.
    pub fn with_root_certificates(
        policy: PolicyContext,
        roots: Vec<reqwest::Certificate>,
    ) -> ApiResult<Self> {
        Ok(Self {
            certificates: Arc::new(CertificateStore::new()),
            clients: Arc::new(BoundClientRegistry::with_root_certificates(roots)?),
            pipeline: Arc::new(ResiliencePipeline::new(Arc::new(policy))),
        })
    }
}

/// Body of an outbound call.
#[derive(Debug, Clone)]
pub struct RequestBody {
    content: Bytes,
    content_type: HeaderValue,
}

impl RequestBody {
    /// Serialize `value` as JSON.
    pub fn json<B: Serialize + ?Sized>(value: &B) -> ApiResult<Self> {
        let content = serde_json::to_vec(value).map_err(ApiError::Encode)?;
        Ok(Self {
            content: Bytes::from(content),
            content_type: json_content_type(),
        })
    }

    pub fn raw(content: impl Into<Bytes>, content_type: &str) -> ApiResult<Self> {
        let content_type = HeaderValue::from_str(content_type).map_err(|e| ApiError::InvalidHeader {
            name: "content-type".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            content: content.into(),
            content_type,
        })
    }
}

/// Point-in-time view of the forwarder's caches and breakers.
#[derive(Debug, Clone, Serialize)]
pub struct ForwarderStatus {
    pub target: Option<String>,
    pub pending_base_domain: Option<String>,
    pub certificates: Vec<Identity>,
    pub bound_clients: Vec<Identity>,
    pub circuits: Vec<CircuitStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub key: String,
    pub state: CircuitState,
}

/// Certificate-aware client for one remote API.
#[derive(Debug)]
pub struct RequestForwarder {
    settings: ClientConfig,
    certificate_defaults: CertificateConfig,
    default_headers: HeaderMap,
    /// Headers from `default_headers` that steer routing. Never sent.
    default_routing: HeaderMap,
    pending_domain: ArcSwapOption<String>,
    target: ArcSwapOption<Url>,
    components: Components,
}

impl RequestForwarder {
    /// Build a forwarder with fresh caches and breakers.
    pub fn new(config: &RelayConfig) -> ApiResult<Self> {
        let roots = load_root_certificates(&config.client.root_certificates)?;
        let components =
            Components::with_root_certificates(PolicyContext::from(&config.resilience), roots)?;
        Self::with_components(config.client.clone(), config.certificates.clone(), components)
    }

    pub fn with_components(
        settings: ClientConfig,
        certificate_defaults: CertificateConfig,
        components: Components,
    ) -> ApiResult<Self> {
        let mut default_headers = HeaderMap::new();
        let mut default_routing = HeaderMap::new();
        for (name, value) in &settings.default_headers {
            let (name, value) = parse_header(name, value)?;
            if is_routing_header(name.as_str()) {
                default_routing.insert(name, value);
            } else {
                default_headers.insert(name, value);
            }
        }

        let pending_domain = settings
            .base_domain
            .clone()
            .filter(|d| !d.trim().is_empty())
            .map(Arc::new);

        Ok(Self {
            settings,
            certificate_defaults,
            default_headers,
            default_routing,
            pending_domain: ArcSwapOption::new(pending_domain),
            target: ArcSwapOption::empty(),
            components,
        })
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn certificate_defaults(&self) -> &CertificateConfig {
        &self.certificate_defaults
    }

    /// Overall deadline for one call.
    pub fn call_deadline(&self) -> Deadline {
        Deadline::after(self.settings.timeout())
    }

    /// Change the base domain. Takes effect once the target is (re)configured.
    pub fn set_base_domain(&self, domain: impl Into<String>) {
        let domain = domain.into();
        tracing::info!(base_domain = %domain, "Base domain updated");
        self.pending_domain.store(Some(Arc::new(domain)));
    }

    /// Discard the configured target; the next call re-reads the base domain.
    pub fn reset(&self) {
        if self.target.swap(None).is_some() {
            tracing::info!("Client target reset");
        }
    }

    pub fn target(&self) -> Option<Arc<Url>> {
        self.target.load_full()
    }

    /// Configured target, configuring it from the base domain on first use.
    pub fn ensure_configured(&self) -> ApiResult<Arc<Url>> {
        if let Some(target) = self.target.load_full() {
            return Ok(target);
        }

        let domain = self
            .pending_domain
            .load_full()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ApiError::Configuration("'base_domain' is not configured".to_string()))?;
        let url = Url::parse(domain.trim())
            .map_err(|e| ApiError::Configuration(format!("invalid base_domain '{domain}': {e}")))?;
        if url.cannot_be_a_base() {
            return Err(ApiError::Configuration(format!(
                "base_domain '{domain}' cannot be used as a base URL"
            )));
        }

        let candidate = Arc::new(url);
        let previous = self
            .target
            .rcu(|current| current.clone().or_else(|| Some(candidate.clone())));
        match previous {
            Some(existing) => Ok(existing),
            None => {
                tracing::info!(base_url = %candidate, "Client target configured");
                Ok(candidate)
            }
        }
    }

    /// Drop one identity's certificate and bound client.
    pub fn forget_identity(&self, identity: &Identity) -> bool {
        let certificate = self.components.certificates.forget(identity);
        let client = self.components.clients.forget(identity);
        certificate || client
    }

    /// Drop every cached certificate and bound client. Returns the number of identities dropped.
    pub fn forget_all_identities(&self) -> usize {
        let certificates = self.components.certificates.forget_all();
        let clients = self.components.clients.forget_all();
        certificates.max(clients)
    }

    pub fn status(&self) -> ForwarderStatus {
        ForwarderStatus {
            target: self.target().map(|t| t.to_string()),
            pending_base_domain: self.pending_domain.load_full().map(|d| (*d).clone()),
            certificates: self.components.certificates.identities(),
            bound_clients: self.components.clients.identities(),
            circuits: self
                .components
                .pipeline
                .circuit_states()
                .into_iter()
                .map(|(key, state)| CircuitStatus { key, state })
                .collect(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, token: &str) -> ApiResult<T> {
        let reply = self.send(Method::GET, endpoint, None, Some(token), None).await?;
        Ok(reply.payload)
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B, token: Option<&str>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let reply = self
            .send(Method::POST, endpoint, Some(RequestBody::json(body)?), token, None)
            .await?;
        Ok(reply.payload)
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B, token: Option<&str>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let reply = self
            .send(Method::PUT, endpoint, Some(RequestBody::json(body)?), token, None)
            .await?;
        Ok(reply.payload)
    }

    pub async fn patch<T, B>(&self, endpoint: &str, body: &B, token: Option<&str>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let reply = self
            .send(Method::PATCH, endpoint, Some(RequestBody::json(body)?), token, None)
            .await?;
        Ok(reply.payload)
    }

    /// Send a call and classify its terminal response.
    ///
    /// `routing` carries per-call routing headers; they override any routing
    /// entries in the configured default headers.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        token: Option<&str>,
        routing: Option<&HeaderMap>,
    ) -> ApiResult<Reply<T>> {
        let start = Instant::now();
        let method_label = method.to_string();
        let (request, route) = self.prepare(method, endpoint, body, token, routing)?;
        let result = self.dispatch(&request, &route, endpoint, self.call_deadline()).await;
        record(&method_label, &result, start);
        classify_reply(endpoint, &result?)
    }

    /// GET raw content. Content type falls back to the configured default.
    pub async fn download(&self, endpoint: &str, token: Option<&str>) -> ApiResult<Download> {
        self.download_with(Method::GET, endpoint, None, token, None).await
    }

    /// Download with an explicit method and an optional multipart form body.
    pub async fn download_with(
        &self,
        method: Method,
        endpoint: &str,
        form: Option<String>,
        token: Option<&str>,
        routing: Option<&HeaderMap>,
    ) -> ApiResult<Download> {
        let start = Instant::now();
        let method_label = method.to_string();
        let body = form
            .map(|form| RequestBody::raw(form, "multipart/form-data"))
            .transpose()?;
        let (request, route) = self.prepare(method, endpoint, body, token, routing)?;
        let result = self.dispatch(&request, &route, endpoint, self.call_deadline()).await;
        record(&method_label, &result, start);
        classify_download(endpoint, &result?, &self.settings.download_content_type)
    }

    /// Dispatch a prepared request on the transport `route` selects.
    ///
    /// Returns the terminal response unclassified. A transient response that
    /// outlived every retry is returned as-is.
    pub async fn dispatch(
        &self,
        request: &OutboundRequest,
        route: &RouteDecision,
        endpoint: &str,
        deadline: Deadline,
    ) -> ApiResult<BufferedResponse> {
        let (client, identity) = match route {
            RouteDecision::Default => (self.components.clients.default_client().clone(), None),
            RouteDecision::CertBound(params) => {
                let material = self
                    .components
                    .certificates
                    .resolve(&params.identity, &params.source)
                    .await?;
                let bound = self
                    .components
                    .clients
                    .client_for(&params.identity, &material)
                    .await?;
                (bound.http().clone(), Some(&params.identity))
            }
        };

        let key = breaker_key(identity, &request.url);
        tracing::debug!(
            method = %request.method,
            endpoint = %endpoint,
            breaker = %key,
            "Dispatching call"
        );

        self.components
            .pipeline
            .execute(&key, deadline, |attempt| {
                let send = request.to_reqwest(&client).send();
                async move {
                    tracing::trace!(attempt, "Sending attempt");
                    let response = send.await?;
                    BufferedResponse::read(response).await
                }
            })
            .await
            .map_err(|e| translate(endpoint, e))
    }

    fn prepare(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        token: Option<&str>,
        routing: Option<&HeaderMap>,
    ) -> ApiResult<(OutboundRequest, RouteDecision)> {
        let target = self.ensure_configured()?;
        let url = target.join(endpoint).map_err(|e| ApiError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let mut route_headers = self.default_routing.clone();
        if let Some(routing) = routing {
            for (name, value) in routing.iter() {
                if is_routing_header(name.as_str()) {
                    route_headers.insert(name.clone(), value.clone());
                }
            }
        }
        let route = classify_route(&route_headers, &self.certificate_defaults);

        let mut request = OutboundRequest::new(method, url);
        request.headers = self.default_headers.clone();
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                ApiError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                    reason: e.to_string(),
                }
            })?;
            request.headers.insert(AUTHORIZATION, value);
        }
        if let Some(body) = body {
            request = request.with_body(body.content, body.content_type);
        }

        Ok((request, route))
    }
}

fn parse_header(name: &str, value: &str) -> ApiResult<(HeaderName, HeaderValue)> {
    let invalid = |reason: String| ApiError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    let header =
        HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok((header, value))
}

/// Breaker key: `<identity|default>@<host>:<port>`.
pub fn breaker_key(identity: Option<&Identity>, url: &Url) -> String {
    let identity = identity.map_or(DEFAULT_BREAKER_IDENTITY, Identity::as_str);
    let host = url.host_str().unwrap_or("");
    match url.port_or_known_default() {
        Some(port) => format!("{identity}@{host}:{port}"),
        None => format!("{identity}@{host}"),
    }
}

fn translate(endpoint: &str, err: PolicyError<reqwest::Error>) -> ApiError {
    let endpoint = endpoint.to_string();
    match err {
        PolicyError::Timeout(elapsed) | PolicyError::DeadlineExceeded(elapsed) => {
            ApiError::Timeout { endpoint, elapsed }
        }
        PolicyError::CircuitOpen { retry_after } => ApiError::CircuitOpen {
            endpoint,
            retry_after,
        },
        PolicyError::Inner(source) => ApiError::Transport { endpoint, source },
    }
}

fn record(method: &str, result: &ApiResult<BufferedResponse>, start: Instant) {
    let status = match result {
        Ok(response) => response.status.as_u16(),
        Err(_) => 0,
    };
    metrics::record_call(method, status, "client", start);
}
