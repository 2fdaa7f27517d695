//! Route selection for outbound calls.
//!
//! # Data Flow
//! ```text
//! Request headers (X-Client-Id, X-Client-Secret, X-Certificate | X-Dir-Base/X-File-Name)
//!     → matcher.rs (read non-blank header values)
//!     → router.rs (decide default vs certificate-bound)
//!     → Return: RouteDecision
//! ```
//!
//! # Design Decisions
//! - Decided once per call, before any I/O
//! - An incomplete header set is not an error; the call uses the default client
//! - Inline certificates win over file references when both are present

pub mod matcher;
pub mod router;

pub use matcher::{
    CERTIFICATE_HEADER, CLIENT_ID_HEADER, CLIENT_SECRET_HEADER, DIR_BASE_HEADER, FILE_NAME_HEADER,
    ROUTING_HEADERS,
};
pub use router::{classify_route, CertificateParams, RouteDecision};
