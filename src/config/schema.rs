//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the certificate-aware relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Outbound client settings (target host, deadlines, default headers).
    pub client: ClientConfig,

    /// Retry, breaker and timeout policy.
    pub resilience: ResilienceConfig,

    /// Certificate lookup defaults.
    pub certificates: CertificateConfig,

    /// Pass-through listener settings.
    pub relay: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base domain every endpoint is resolved against (required before first call).
    pub base_domain: Option<String>,

    /// Overall per-call deadline in seconds, retries included.
    pub timeout_secs: u64,

    /// Headers attached to every outbound request.
    pub default_headers: BTreeMap<String, String>,

    /// Content type reported for downloads whose response omits one.
    pub download_content_type: String,

    /// PEM files with extra roots trusted for the upstream, on top of the system store.
    pub root_certificates: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_domain: None,
            timeout_secs: 60,
            default_headers: default_headers(),
            download_content_type: "application/pdf".to_string(),
            root_certificates: Vec::new(),
        }
    }
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept".to_string(), "application/json".to_string()),
        ("Accept-Encoding".to_string(), "gzip, deflate, br".to_string()),
        ("Connection".to_string(), "keep-alive".to_string()),
    ])
}

impl ClientConfig {
    /// Overall call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry, circuit breaker and per-attempt timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Upper bound for a single attempt in milliseconds.
    pub attempt_timeout_ms: u64,

    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each backoff delay.
    pub jitter: bool,

    /// Consecutive transient failures before the breaker opens.
    pub breaker_threshold: u32,

    /// How long an open breaker rejects calls, in milliseconds.
    pub breaker_cooldown_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 25_000,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: true,
            breaker_threshold: 5,
            breaker_cooldown_ms: 25_000,
        }
    }
}

/// Defaults for file-based certificate resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Directory used when a request names a file but no `X-Dir-Base`.
    pub dir_base: Option<String>,

    /// File name used when a request names a directory but no `X-File-Name`.
    pub file_name: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            dir_base: None,
            file_name: "client.p12".to_string(),
        }
    }
}

/// Relay listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Largest inbound body buffered for forwarding.
    pub max_body_bytes: usize,

    /// Keep the certificate routing headers on forwarded requests.
    pub forward_routing_headers: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_body_bytes: 10 * 1024 * 1024,
            forward_routing_headers: false,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the operator API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
