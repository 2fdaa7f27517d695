//! Network layer.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake, rustls)
//!     → Hand off to the relay router
//! ```
//!
//! Outbound mutual TLS lives with the bound clients, not here.

pub mod tls;

pub use tls::load_tls_config;
