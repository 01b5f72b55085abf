//! Proxy nodes: per-replica native resources arranged in a tree.
//!
//! # Responsibilities
//! - Hold one native handle per live replica (connection, statement, cursor...)
//! - Route invocations through the cluster dispatcher
//! - Derive child nodes from a parent's handles
//! - Cascade deactivation and close through the tree
//!
//! # Design Decisions
//! - Parents own children strongly; children only hold a `Weak` back-reference
//! - Registration of a new node happens inside the cluster critical section,
//!   after dropping entries for replicas that are no longer live
//! - Closing is idempotent and always closes children before the node's own handles

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::{Mutex, MutexGuard};

use crate::cluster::dispatch::{DispatchMode, Outcome};
use crate::cluster::error::{ClusterError, ClusterResult};
use crate::cluster::registry::Cluster;
use crate::cluster::resources::{release, HandleFactory, ResourceMap};
use crate::driver::{NativeError, NativeHandle, Session};
use crate::replica::Replica;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a proxy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum NodeState {
    Open = 0,
    Closed = 1,
}

/// How a new node fills its resource map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Population {
    /// Create a handle for every live replica up front, through a Broadcast.
    #[default]
    Eager,
    /// Create each handle the first time its replica is used.
    Lazy,
}

/// Type-erased view of a proxy node, used for cascades.
#[async_trait]
pub(crate) trait ProxyResource: Send + Sync {
    fn node_id(&self) -> NodeId;

    fn is_closed(&self) -> bool;

    /// Drop the handle for `replica` from this node and every descendant.
    fn drop_replica(&self, replica: &Replica);

    fn detach_child(&self, id: NodeId);

    async fn close(&self);
}

/// A proxied resource: one native handle per live replica.
pub struct ProxyNode<H: NativeHandle> {
    id: NodeId,
    cluster: Arc<Cluster>,
    parent: Option<Weak<dyn ProxyResource>>,
    resources: ResourceMap<H>,
    children: Mutex<HashMap<NodeId, Arc<dyn ProxyResource>>>,
    state: AtomicU8,
}

impl<H: NativeHandle> ProxyNode<H> {
    fn new(cluster: Arc<Cluster>, parent: Option<Weak<dyn ProxyResource>>, resources: ResourceMap<H>) -> Self {
        Self {
            id: NodeId::next(),
            cluster,
            parent,
            resources,
            children: Mutex::new(HashMap::new()),
            state: AtomicU8::new(NodeState::Open as u8),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn resources(&self) -> &ResourceMap<H> {
        &self.resources
    }

    /// The handle currently held for `replica`, if any.
    pub fn handle(&self, replica: &Replica) -> Option<Arc<H>> {
        self.resources.get(replica)
    }

    pub fn replicas(&self) -> Vec<Replica> {
        self.resources.replicas()
    }

    pub fn child_count(&self) -> usize {
        self.lock_children().len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == NodeState::Closed as u8
    }

    fn ensure_open(&self) -> ClusterResult<()> {
        if self.is_closed() {
            return Err(ClusterError::Closed(self.id));
        }
        Ok(())
    }

    fn lock_children(&self) -> MutexGuard<'_, HashMap<NodeId, Arc<dyn ProxyResource>>> {
        self.children.lock()
    }

    /// Run `operation` on this node's handles under `mode`.
    pub async fn invoke<T, F, Fut>(&self, mode: DispatchMode, operation: F) -> ClusterResult<Outcome<T>>
    where
        T: Send + 'static,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, NativeError>> + Send + 'static,
    {
        self.ensure_open()?;
        self.cluster.dispatch(mode, &self.resources, operation).await
    }

    /// SelectOne invocation returning the single result.
    pub async fn read<T, F, Fut>(&self, operation: F) -> ClusterResult<T>
    where
        T: Send + 'static,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, NativeError>> + Send + 'static,
    {
        self.invoke(DispatchMode::SelectOne, operation)
            .await?
            .into_any()
            .ok_or_else(|| ClusterError::ClusterExhausted(self.cluster.name().to_string()))
    }

    /// Broadcast invocation.
    pub async fn write<T, F, Fut>(&self, operation: F) -> ClusterResult<Outcome<T>>
    where
        T: Send + 'static,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, NativeError>> + Send + 'static,
    {
        self.invoke(DispatchMode::Broadcast, operation).await
    }

    /// Create a child node whose handles are produced from this node's handles.
    pub async fn derive<C, F, Fut>(self: &Arc<Self>, population: Population, create: F) -> ClusterResult<Arc<ProxyNode<C>>>
    where
        C: NativeHandle,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, NativeError>> + Send + 'static,
    {
        self.ensure_open()?;

        let resources = match population {
            Population::Eager => self.cluster.populate(&self.resources, create).await?,
            Population::Lazy => {
                let source = Arc::downgrade(self);
                let create = Arc::new(create);
                let factory: HandleFactory<C> = Arc::new(move |replica: Replica| {
                    let source = source.clone();
                    let create = Arc::clone(&create);
                    async move {
                        let parent = source
                            .upgrade()
                            .ok_or_else(|| NativeError::from("parent resource is closed"))?;
                        let handle = parent
                            .resources
                            .resolve(&parent.cluster, &replica)
                            .await?
                            .ok_or_else(|| NativeError::from(format!("no parent handle for replica '{}'", replica)))?;
                        (*create)(replica, handle).await
                    }
                    .boxed()
                });
                ResourceMap::lazy(factory)
            }
        };

        let weak: Weak<ProxyNode<H>> = Arc::downgrade(self);
        let parent: Weak<dyn ProxyResource> = weak;
        let child = Arc::new(ProxyNode::new(Arc::clone(&self.cluster), Some(parent), resources));
        self.adopt(&child).await?;

        tracing::debug!(
            cluster = %self.cluster.name(),
            parent = %self.id,
            node = %child.id,
            population = ?population,
            "Derived proxy resource"
        );
        Ok(child)
    }

    async fn adopt<C: NativeHandle>(&self, child: &Arc<ProxyNode<C>>) -> ClusterResult<()> {
        let entry: Arc<dyn ProxyResource> = child.clone();
        let (stale, accepted) = self.cluster.critical_section(|live| {
            let stale = child.resources.retain_live(live);
            let mut children = self.lock_children();
            if self.is_closed() {
                return (stale, false);
            }
            children.insert(child.id, entry);
            (stale, true)
        });

        release(self.cluster.name(), stale).await;
        if !accepted {
            child.close().await;
            return Err(ClusterError::Closed(self.id));
        }
        Ok(())
    }

    /// Deactivate `replica` for the whole cluster.
    ///
    /// The replica leaves the live set, every node of the cluster drops its
    /// handle and the deactivation is announced. Returns false if it was not live.
    pub fn deactivate(&self, replica: &Replica) -> bool {
        self.cluster.deactivate(replica)
    }

    /// Drop the handle for `replica` here and in every descendant.
    ///
    /// Only reached from the cluster's deactivation, inside its critical
    /// section, so the handle is closed on a background task rather than awaited.
    pub(crate) fn drop_replica(&self, replica: &Replica) {
        if let Some(handle) = self.resources.remove(replica) {
            tracing::debug!(node = %self.id, replica = %replica, "Dropping handle of deactivated replica");
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let cluster = self.cluster.name().to_string();
                    let replica = replica.clone();
                    runtime.spawn(async move {
                        release(&cluster, vec![(replica, handle)]).await;
                    });
                }
                Err(_) => {
                    tracing::debug!(node = %self.id, "No runtime available, handle dropped without close");
                }
            }
        }

        let children: Vec<Arc<dyn ProxyResource>> = self.lock_children().values().cloned().collect();
        for child in children {
            child.drop_replica(replica);
        }
    }

    /// Close descendants, then this node's handles. Later calls are no-ops.
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(
                NodeState::Open as u8,
                NodeState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let children: Vec<Arc<dyn ProxyResource>> = self.lock_children().drain().map(|(_, c)| c).collect();
        for child in children {
            child.close().await;
        }

        release(self.cluster.name(), self.resources.drain()).await;

        match &self.parent {
            Some(parent) => {
                if let Some(parent) = parent.upgrade() {
                    parent.detach_child(self.id);
                }
            }
            None => self.cluster.detach_root(self.id),
        }
        tracing::debug!(cluster = %self.cluster.name(), node = %self.id, "Closed proxy resource");
    }
}

#[async_trait]
impl<H: NativeHandle> ProxyResource for ProxyNode<H> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_closed(&self) -> bool {
        ProxyNode::is_closed(self)
    }

    fn drop_replica(&self, replica: &Replica) {
        ProxyNode::drop_replica(self, replica)
    }

    fn detach_child(&self, id: NodeId) {
        self.lock_children().remove(&id);
    }

    async fn close(&self) {
        ProxyNode::close(self).await
    }
}

impl<H: NativeHandle> fmt::Debug for ProxyNode<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyNode")
            .field("id", &self.id)
            .field("cluster", &self.cluster.name())
            .field("resources", &self.resources)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ProxyNode<Box<dyn Session>> {
    /// Execute a write on every live replica, returning one affected-row count.
    pub async fn execute(&self, statement: &str) -> ClusterResult<u64> {
        let statement: Arc<str> = Arc::from(statement);
        self.write(move |_, session| {
            let statement = Arc::clone(&statement);
            async move { session.execute(&statement).await }
        })
        .await?
        .into_any()
        .ok_or_else(|| ClusterError::ClusterExhausted(self.cluster.name().to_string()))
    }

    /// Run a read on one balancer-selected replica.
    pub async fn query(&self, statement: &str) -> ClusterResult<Vec<String>> {
        let statement: Arc<str> = Arc::from(statement);
        self.read(move |_, session| {
            let statement = Arc::clone(&statement);
            async move { session.query(&statement).await }
        })
        .await
    }
}

impl Cluster {
    /// Open a root resource, creating one handle per replica with `create`.
    pub async fn open<H, F, Fut>(self: &Arc<Self>, population: Population, create: F) -> ClusterResult<Arc<ProxyNode<H>>>
    where
        H: NativeHandle,
        F: Fn(Replica) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<H, NativeError>> + Send + 'static,
    {
        let resources = match population {
            Population::Eager => {
                let seed = ResourceMap::eager(self.live_replicas().iter().map(|r| (r.clone(), ())));
                self.populate(&seed, move |replica, _| create(replica)).await?
            }
            Population::Lazy => {
                let create = Arc::new(create);
                let factory: HandleFactory<H> = Arc::new(move |replica: Replica| (*create)(replica).boxed());
                ResourceMap::lazy(factory)
            }
        };

        let node = Arc::new(ProxyNode::new(Arc::clone(self), None, resources));
        let entry: Arc<dyn ProxyResource> = node.clone();
        let stale = self.critical_section(|live| {
            let stale = node.resources.retain_live(live);
            self.register_root(entry);
            stale
        });
        release(self.name(), stale).await;

        tracing::debug!(
            cluster = %self.name(),
            node = %node.id,
            replicas = node.resources.len(),
            population = ?population,
            "Opened proxy resource"
        );
        Ok(node)
    }

    /// Open a root node of native sessions through the cluster's connector.
    pub async fn connect(self: &Arc<Self>) -> ClusterResult<Arc<ProxyNode<Box<dyn Session>>>> {
        let connector = Arc::clone(self.connector());
        self.open(Population::Eager, move |replica| {
            let connector = Arc::clone(&connector);
            async move { connector.connect(&replica).await }
        })
        .await
    }
}
