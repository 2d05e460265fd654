//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → environment overlay (loader.rs)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//!     → UpstreamConfig pair built once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - A missing primary credential is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackupConfig, EgressConfig, FailoverConfig, ListenerConfig, ObservabilityConfig,
    PrimaryConfig, ProxyConfig, TimeoutConfig,
};
