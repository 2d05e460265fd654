//! Upstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest (buffered body)
//!     → transform (strip thinking blocks, model override)
//!     → headers.rs (auth, fixed headers, framing)
//!     → egress.rs (direct or relayed client by host)
//!     → dispatcher.rs send
//!         → 429/529 or transport error on the first attempt with a backup:
//!           failover report → rebuild for the other upstream → send once more
//!     → Dispatched (response to relay, or error for a 502)
//! ```
//!
//! # Design Decisions
//! - At most two attempts per inbound request, expressed as two calls
//!   rather than a loop
//! - The retry's response is final whatever its status

pub mod dispatcher;
pub mod egress;
pub mod headers;

pub use dispatcher::{
    error_chain, is_rate_limited, AttemptOutcome, DispatchError, Dispatched, Dispatcher,
    InboundRequest, OutboundRequest,
};
pub use egress::{BypassList, OutboundClients};
