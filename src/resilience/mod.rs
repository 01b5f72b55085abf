//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch unit against a replica:
//!     → timeouts.rs (optional per-unit deadline, elapsed = native failure)
//!
//! Membership delivery to a peer:
//!     → backoff.rs (RetryPolicy: bounded tries, exponential backoff with jitter)
//! ```
//!
//! # Design Decisions
//! - An elapsed unit is classified through the health probe like any other failure
//! - Jittered backoff prevents peers from being hammered in lockstep

pub mod backoff;
pub mod timeouts;

pub use backoff::RetryPolicy;
pub use timeouts::{run_bounded, UnitTimeout};
