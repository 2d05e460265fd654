//! Failover reverse proxy for Anthropic-compatible chat APIs.

pub mod config;
pub mod dispatch;
pub mod failover;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod transform;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use failover::FailoverMachine;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use upstream::Upstream;
