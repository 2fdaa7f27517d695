//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → PolicyContext / ClientSettings shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; policy parameters never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CertificateConfig, ClientConfig, ListenerConfig, ObservabilityConfig, RelayConfig,
    ResilienceConfig, TlsConfig,
};
