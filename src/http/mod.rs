//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Library call (get/post/put/patch/send/download)     Inbound relay request
//!     → forwarder.rs (target, headers, token)              → server.rs (buffer body, clone)
//!                  \                                       /
//!                   → routing (default vs certificate-bound)
//!                   → resilience pipeline (retry → breaker → timeout)
//!                   → request.rs (rebuild attempt) → transport
//!                   → response.rs (buffer, classify or relay)
//! ```

pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::{Components, ForwarderStatus, RequestBody, RequestForwarder};
pub use request::{OutboundRequest, RequestIdLayer, X_REQUEST_ID};
pub use response::{BufferedResponse, Download, Reply};
pub use server::RelayServer;
