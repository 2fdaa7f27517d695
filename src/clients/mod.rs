//! Identity-scoped transports.
//!
//! # Data Flow
//! ```text
//! RouteDecision::CertBound
//!     → certificates::store (material, cached)
//!     → registry.rs (one reqwest::Client per identity, cached)
//!     → shared by every in-flight call for that identity
//! ```

pub mod registry;

pub use registry::{load_root_certificates, BoundClient, BoundClientRegistry};
