//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! On-demand probe (checker.rs):
//!     Failed dispatch unit
//!     → fresh session + validation statement
//!     → alive / dead verdict
//!
//! Background monitor (monitor.rs):
//!     Periodic timer
//!     → probe each live replica
//!     → consecutive failures ≥ threshold → deactivate
//! ```
//!
//! # Design Decisions
//! - A probe never reuses the failed handle
//! - Probe errors and timeouts both mean dead
//! - The monitor is optional; dispatch-time probing alone keeps the set correct

pub mod checker;
pub mod monitor;

pub use checker::HealthChecker;
pub use monitor::HealthMonitor;
