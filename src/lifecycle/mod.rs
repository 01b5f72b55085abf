//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Membership transport → ClusterManager → clusters → monitor → admin API
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → return to the supervisor
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → tasks exit their loops → drain with deadline
//! ```
//!
//! # Design Decisions
//! - Ordered startup: membership first, then clusters, then listeners
//! - Shutdown has a deadline: remaining tasks are aborted after it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError, Supervisor};
