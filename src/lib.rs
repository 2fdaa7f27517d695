//! Certificate-aware HTTP API client with retry, circuit breaking and timeouts.

pub mod admin;
pub mod cache;
pub mod certificates;
pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use certificates::{CertificateSource, CertificateStore, Identity};
pub use clients::BoundClientRegistry;
pub use config::schema::RelayConfig;
pub use error::{ApiError, ApiResult};
pub use http::{RelayServer, RequestForwarder};
pub use lifecycle::Shutdown;
pub use resilience::ResiliencePipeline;
pub use routing::{classify_route, RouteDecision};
