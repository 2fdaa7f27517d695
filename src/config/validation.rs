//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! constraints. All problems are collected so an operator sees them at once.

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(domain) = &config.client.base_domain {
        if let Err(e) = Url::parse(domain) {
            errors.push(ValidationError::new(
                "client.base_domain",
                format!("'{domain}' is not a URL: {e}"),
            ));
        }
    }
    if config.client.timeout_secs == 0 {
        errors.push(ValidationError::new("client.timeout_secs", "must be greater than zero"));
    }
    if config.client.root_certificates.iter().any(|p| p.trim().is_empty()) {
        errors.push(ValidationError::new("client.root_certificates", "paths must not be blank"));
    }

    let resilience = &config.resilience;
    if resilience.attempt_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "resilience.attempt_timeout_ms",
            "must be greater than zero",
        ));
    }
    if resilience.breaker_threshold == 0 {
        errors.push(ValidationError::new(
            "resilience.breaker_threshold",
            "must be greater than zero",
        ));
    }
    if resilience.breaker_cooldown_ms == 0 {
        errors.push(ValidationError::new(
            "resilience.breaker_cooldown_ms",
            "must be greater than zero",
        ));
    }
    if resilience.max_delay_ms < resilience.base_delay_ms {
        errors.push(ValidationError::new(
            "resilience.max_delay_ms",
            format!(
                "{} is smaller than base_delay_ms {}",
                resilience.max_delay_ms, resilience.base_delay_ms
            ),
        ));
    }

    if config.relay.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("relay.bind_address", "not a socket address"));
    }
    if config.relay.max_body_bytes == 0 {
        errors.push(ValidationError::new("relay.max_body_bytes", "must be greater than zero"));
    }

    if config.admin.enabled {
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
