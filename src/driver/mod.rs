//! Native driver seam.
//!
//! # Responsibilities
//! - Define what the proxy needs from a database driver
//! - Open independent sessions for health probes
//! - Close native handles owned by proxy nodes
//!
//! # Design Decisions
//! - Driver errors are opaque boxed errors; the proxy never inspects them
//! - Handles are shared behind `Arc` so Broadcast units can run concurrently
//! - Concrete SQL drivers live outside this crate; `tcp.rs` only checks reachability

pub mod tcp;

use async_trait::async_trait;

use crate::replica::Replica;

/// Error raised by a native driver.
pub type NativeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A native per-replica resource (connection, statement, cursor...).
#[async_trait]
pub trait NativeHandle: Send + Sync + 'static {
    /// Release the resource. Called at most once by the owning proxy node.
    async fn close(&self) -> Result<(), NativeError> {
        Ok(())
    }
}

/// Placeholder handle used to seed eager root population.
impl NativeHandle for () {}

/// A native connection able to run a statement.
#[async_trait]
pub trait Session: NativeHandle {
    /// Execute `statement`, returning the affected row count.
    async fn execute(&self, statement: &str) -> Result<u64, NativeError>;

    /// Execute a read-only `statement`, returning its rows rendered as text.
    async fn query(&self, statement: &str) -> Result<Vec<String>, NativeError>;
}

#[async_trait]
impl NativeHandle for Box<dyn Session> {
    async fn close(&self) -> Result<(), NativeError> {
        (**self).close().await
    }
}

/// Opens native sessions to a replica.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, replica: &Replica) -> Result<Box<dyn Session>, NativeError>;
}
