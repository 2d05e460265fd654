//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → machine.rs select_target (cooldown recovery, read active once)
//!     → dispatcher sends attempt
//!     → on 429/529/transport error: machine.rs report_failure
//!         → transition (flip, timestamp) → persistence.rs save
//!         → retry target handed back to the dispatcher (first attempt only)
//!
//! Startup: persistence.rs load → machine.rs (enforce backup availability)
//! Shutdown: machine.rs flush → persistence.rs save
//! ```

pub mod machine;
pub mod persistence;
pub mod state;

pub use machine::{Attempt, FailoverMachine, FailureSignal, SwitchReason};
pub use persistence::{PersistError, StateStore};
pub use state::{ProxyState, UpstreamCounters};
