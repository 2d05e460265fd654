//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every ShutdownListener resolves
//!     → server stops accepting, drains in-flight requests
//!     → failover state flushed to disk → exit
//! ```
//!
//! # Design Decisions
//! - Listeners subscribe before the trigger is armed, so no signal is missed
//! - No forced-exit deadline: in-flight streams finish on their own

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownListener};
pub use signals::shutdown_signal;
