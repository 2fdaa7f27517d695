//! Response buffering and classification.
//!
//! # Responsibilities
//! - Read a response fully inside the attempt so body failures are retried
//! - Turn a terminal response into a typed payload or an [`ApiError`]
//! - Relay a buffered response back to an inbound caller
//!
//! # Design Decisions
//! - A non-blank body is parsed whatever the status; error payloads are payloads
//! - A blank body maps through the status table, 2xx included

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};
use crate::resilience::Transient;

/// Status, headers and full body of an upstream response.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    pub async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// True unless the body is empty or only whitespace.
    pub fn has_body(&self) -> bool {
        !self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Convert into an axum response, dropping hop-by-hop framing headers.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in self.headers.iter() {
            if name == CONNECTION || name == TRANSFER_ENCODING || name == CONTENT_LENGTH {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        response
    }
}

impl Transient for BufferedResponse {
    fn is_transient(&self) -> bool {
        self.status.is_transient()
    }
}

/// Deserialize the body, or map a blank response through the status table.
pub fn classify<T: DeserializeOwned>(endpoint: &str, response: &BufferedResponse) -> ApiResult<T> {
    if response.has_body() {
        return serde_json::from_slice(&response.body).map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            status: response.status.as_u16(),
            source,
        });
    }
    Err(ApiError::from_status(endpoint, response.status.as_u16()))
}

/// Payload of a classified call and the content type it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub payload: T,
    pub content_type: Option<String>,
}

/// [`classify`], keeping the response content type.
pub fn classify_reply<T: DeserializeOwned>(
    endpoint: &str,
    response: &BufferedResponse,
) -> ApiResult<Reply<T>> {
    Ok(Reply {
        payload: classify(endpoint, response)?,
        content_type: response.content_type().map(str::to_string),
    })
}

/// Raw content of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub content: Bytes,
    pub content_type: String,
}

/// Keep the bytes of a 2xx response; anything else maps through the status table.
pub fn classify_download(
    endpoint: &str,
    response: &BufferedResponse,
    fallback_content_type: &str,
) -> ApiResult<Download> {
    if !response.status.is_success() {
        return Err(ApiError::from_status(endpoint, response.status.as_u16()));
    }
    let content_type = response
        .content_type()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(fallback_content_type)
        .to_string();
    Ok(Download {
        content: response.body.clone(),
        content_type,
    })
}

/// `Content-Type` for JSON request bodies.
pub(crate) fn json_content_type() -> HeaderValue {
    HeaderValue::from_static("application/json; charset=utf-8")
}
