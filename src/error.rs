//! Error taxonomy surfaced to callers.
//!
//! Every call-related variant carries the endpoint; status-derived variants
//! also carry the HTTP status so operators can tell a rejected call from an
//! unreachable dependency.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the certificate-bound client layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// File-based certificate path is missing or unreadable.
    #[error("certificate for '{identity}' not found at {path:?}: {reason}")]
    CertificateNotFound {
        identity: String,
        path: PathBuf,
        reason: String,
    },

    /// Blob is not a valid PKCS#12 archive or the passphrase is wrong.
    #[error("certificate for '{identity}' could not be decoded: {reason}")]
    CertificateDecode { identity: String, reason: String },

    /// Credentials differ from the ones the cached certificate was loaded with.
    #[error("credentials for '{identity}' do not match the cached certificate")]
    CertificateMismatch { identity: String },

    /// An attempt or the overall call deadline elapsed.
    #[error("call to {endpoint} timed out after {elapsed:?}")]
    Timeout { endpoint: String, elapsed: Duration },

    /// The breaker for this dependency is open; nothing was sent.
    #[error("circuit open for {endpoint}, retry after {retry_after:?}")]
    CircuitOpen {
        endpoint: String,
        retry_after: Duration,
    },

    #[error("[400] Bad request to endpoint {endpoint}")]
    BadRequest { endpoint: String },

    #[error("[401] Unauthorized call to endpoint {endpoint}")]
    Unauthorized { endpoint: String },

    #[error("[403] Access denied to endpoint {endpoint}")]
    Forbidden { endpoint: String },

    #[error("[404] Endpoint not found: {endpoint}")]
    NotFound { endpoint: String },

    #[error("[500] Internal server fault at endpoint {endpoint}")]
    InternalServerFault { endpoint: String },

    #[error("[503] Service unavailable at endpoint {endpoint}")]
    ServiceUnavailable { endpoint: String },

    #[error("[{status}] Unknown error at endpoint {endpoint}")]
    UnknownStatus { endpoint: String, status: u16 },

    /// Base domain missing or otherwise unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network-level failure that outlived the retry budget.
    #[error("transport failure calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// A body was present but did not match the expected type.
    #[error("[{status}] response from {endpoint} could not be decoded: {source}")]
    Decode {
        endpoint: String,
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request body could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result alias for client operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Map a terminal status with no body onto the taxonomy.
    pub fn from_status(endpoint: impl Into<String>, status: u16) -> Self {
        let endpoint = endpoint.into();
        match status {
            400 => ApiError::BadRequest { endpoint },
            401 => ApiError::Unauthorized { endpoint },
            403 => ApiError::Forbidden { endpoint },
            404 => ApiError::NotFound { endpoint },
            500 => ApiError::InternalServerFault { endpoint },
            503 => ApiError::ServiceUnavailable { endpoint },
            status => ApiError::UnknownStatus { endpoint, status },
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::BadRequest { .. } => Some(400),
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::InternalServerFault { .. } => Some(500),
            ApiError::ServiceUnavailable { .. } => Some(503),
            ApiError::UnknownStatus { status, .. } | ApiError::Decode { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Endpoint the failing call targeted, if the error relates to a call.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ApiError::Timeout { endpoint, .. }
            | ApiError::CircuitOpen { endpoint, .. }
            | ApiError::BadRequest { endpoint }
            | ApiError::Unauthorized { endpoint }
            | ApiError::Forbidden { endpoint }
            | ApiError::NotFound { endpoint }
            | ApiError::InternalServerFault { endpoint }
            | ApiError::ServiceUnavailable { endpoint }
            | ApiError::UnknownStatus { endpoint, .. }
            | ApiError::Transport { endpoint, .. }
            | ApiError::Decode { endpoint, .. }
            | ApiError::InvalidEndpoint { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// True for failures the pipeline would have retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout { .. }
            | ApiError::Transport { .. }
            | ApiError::InternalServerFault { .. }
            | ApiError::ServiceUnavailable { .. } => true,
            ApiError::UnknownStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True when the call was rejected locally by an open breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ApiError::CircuitOpen { .. })
    }

    /// True for certificate resolution failures.
    pub fn is_certificate_error(&self) -> bool {
        matches!(
            self,
            ApiError::CertificateNotFound { .. }
                | ApiError::CertificateDecode { .. }
                | ApiError::CertificateMismatch { .. }
        )
    }
}
