//! Client certificate subsystem.
//!
//! # Data Flow
//! ```text
//! Routing headers / caller
//!     → source.rs (Identity + Inline | FileRef)
//!     → store.rs (decode once per identity, cache)
//!     → CertificateMaterial handed to the bound-client registry
//! ```
//!
//! # Design Decisions
//! - Entries live for the process lifetime; rotation is an explicit operator reset
//! - Decoding is single-flight per identity; different identities never wait on each other
//! - Secrets are never logged

pub mod source;
pub mod store;

pub use source::{CertificateSource, Identity};
pub use store::{CertificateMaterial, CertificateStore};
