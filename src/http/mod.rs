//! HTTP front door.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, request ID, trace, body limit)
//!     → GET /health, /healthz, /brain-status → status.rs
//!     → anything else → server.rs proxy_handler
//!         → failover select_target → dispatch (≤ 2 attempts)
//!         → response.rs relay (streamed) or 502
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod status;

pub use request::{ProxyRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use status::{BrainStatus, HealthReport};
