//! Outbound request construction.
//!
//! # Responsibilities
//! - Tag every inbound request with an `x-request-id`
//! - Clone an inbound request onto the configured target
//! - Rebuild the wire request for each attempt from buffered parts
//!
//! # Design Decisions
//! - Bodies are buffered once as `Bytes`; every retry sends the full payload
//! - Inbound header values are copied as-is, without re-validation
//! - `Host` and `Content-Length` are left to the transport

use std::task::{Context, Poll};

use axum::http::request::Parts;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use reqwest::Method;
use tower::{Layer, Service};
use url::Url;
use uuid::Uuid;

use crate::routing::matcher::strip_routing_headers;

pub const X_REQUEST_ID: &str = "x-request-id";

/// A fully buffered request that can be sent any number of times.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Attach a body and its content type.
    pub fn with_body(mut self, body: impl Into<Bytes>, content_type: HeaderValue) -> Self {
        self.headers.insert(CONTENT_TYPE, content_type);
        self.body = Some(body.into());
        self
    }

    /// Copy an inbound request onto `target`, keeping method, path, query,
    /// headers and body.
    pub fn from_inbound(parts: &Parts, body: Bytes, target: &Url) -> Self {
        let mut url = target.clone();
        let base = target.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", base, parts.uri.path()));
        url.set_query(parts.uri.query());

        let mut headers = HeaderMap::with_capacity(parts.headers.len());
        for (name, value) in parts.headers.iter() {
            if name == HOST || name == CONTENT_LENGTH {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        Self {
            method: parts.method.clone(),
            url,
            headers,
            body: (!body.is_empty()).then_some(body),
        }
    }

    /// Drop the headers that only steer routing.
    pub fn strip_routing_headers(&mut self) {
        strip_routing_headers(&mut self.headers);
    }

    /// Endpoint label used in errors and logs: path plus query.
    pub fn endpoint(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Build one attempt on `client`.
    pub fn to_reqwest(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        match &self.body {
            Some(body) => builder.body(body.clone()),
            None => builder,
        }
    }
}

/// Request id carried by a request, if any.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Adds an `x-request-id` header to requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<axum::http::Request<B>> for RequestIdService<S>
where
    S: Service<axum::http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: axum::http::Request<B>) -> Self::Future {
        if !request.headers().contains_key(X_REQUEST_ID) {
            if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
                request
                    .headers_mut()
                    .insert(HeaderName::from_static(X_REQUEST_ID), value);
            }
        }
        self.inner.call(request)
    }
}
