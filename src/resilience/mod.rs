//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → pipeline.rs (retry loop, outermost)
//!         → circuit_breaker.rs (fail fast when open, single probe when half-open)
//!             → timeouts.rs (per-attempt timeout bounded by the call deadline)
//!                 → dispatch
//!     → retries.rs decides whether the outcome is transient
//!     → backoff.rs sizes the wait before the next attempt
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt and every call has a deadline
//! - Only transient outcomes (network, timeout, 5xx) are retried, never 4xx
//! - Circuit breaker prevents cascading failures; one breaker per identity/host
//! - Policy parameters are fixed at startup and shared read-only

pub mod backoff;
pub mod circuit_breaker;
pub mod pipeline;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use pipeline::{PolicyContext, PolicyError, ResiliencePipeline};
pub use retries::Transient;
pub use timeouts::Deadline;
