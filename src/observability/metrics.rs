//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_attempts_total` (counter): dispatch attempts by outcome
//! - `relay_retries_total` (counter): retries by breaker key
//! - `relay_circuit_rejections_total` (counter): fail-fast rejections by key
//! - `relay_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `relay_certificate_loads_total` (counter): certificate decodes by result
//! - `relay_bound_clients_total` (counter): identity transports created
//! - `relay_call_duration_seconds` (histogram): end-to-end call latency
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_attempt(outcome: &'static str) {
    metrics::counter!("relay_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_retry(key: &str) {
    metrics::counter!("relay_retries_total", "key" => key.to_string()).increment(1);
}

pub fn record_circuit_rejection(key: &str) {
    metrics::counter!("relay_circuit_rejections_total", "key" => key.to_string()).increment(1);
}

pub fn record_circuit_state(key: &str, state: CircuitState) {
    metrics::gauge!("relay_circuit_state", "key" => key.to_string()).set(state as u8 as f64);
}

pub fn record_certificate_load(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!("relay_certificate_loads_total", "result" => result).increment(1);
}

pub fn record_bound_client_created() {
    metrics::counter!("relay_bound_clients_total").increment(1);
}

/// Record a finished call with its method and terminal status (0 when none).
pub fn record_call(method: &str, status: u16, route: &'static str, start: Instant) {
    metrics::histogram!(
        "relay_call_duration_seconds",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route,
    )
    .record(start.elapsed().as_secs_f64());
}
