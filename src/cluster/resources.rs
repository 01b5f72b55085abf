//! Per-node replica → handle maps.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, MutexGuard};

use crate::cluster::registry::Cluster;
use crate::driver::{NativeError, NativeHandle};
use crate::replica::{Replica, ReplicaSet};

/// Creates the handle for one replica on first use.
pub type HandleFactory<H> =
    Arc<dyn Fn(Replica) -> BoxFuture<'static, Result<H, NativeError>> + Send + Sync>;

/// The native handles a proxy node holds, one per replica.
///
/// Eager maps are fully populated at creation. Lazy maps start empty and
/// create a handle the first time a replica is resolved; insertion happens
/// inside the cluster's critical section and is skipped for replicas that
/// were deactivated while the handle was being created.
pub struct ResourceMap<H> {
    handles: Mutex<HashMap<Replica, Arc<H>>>,
    factory: Option<HandleFactory<H>>,
}

impl<H: NativeHandle> ResourceMap<H> {
    pub fn eager(handles: impl IntoIterator<Item = (Replica, H)>) -> Self {
        let handles = handles
            .into_iter()
            .map(|(replica, handle)| (replica, Arc::new(handle)))
            .collect();
        Self {
            handles: Mutex::new(handles),
            factory: None,
        }
    }

    pub fn lazy(factory: HandleFactory<H>) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            factory: Some(factory),
        }
    }

    pub fn is_lazy(&self) -> bool {
        self.factory.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, replica: &Replica) -> bool {
        self.lock().contains_key(replica)
    }

    pub fn get(&self, replica: &Replica) -> Option<Arc<H>> {
        self.lock().get(replica).cloned()
    }

    pub fn replicas(&self) -> Vec<Replica> {
        self.lock().keys().cloned().collect()
    }

    pub(crate) fn remove(&self, replica: &Replica) -> Option<Arc<H>> {
        self.lock().remove(replica)
    }

    pub(crate) fn drain(&self) -> Vec<(Replica, Arc<H>)> {
        self.lock().drain().collect()
    }

    /// Drop entries for replicas missing from `live`, returning them.
    pub(crate) fn retain_live(&self, live: &ReplicaSet) -> Vec<(Replica, Arc<H>)> {
        let mut handles = self.lock();
        let stale: Vec<Replica> = handles
            .keys()
            .filter(|r| !live.contains(r))
            .cloned()
            .collect();
        stale
            .into_iter()
            .filter_map(|r| handles.remove(&r).map(|h| (r, h)))
            .collect()
    }

    /// Replicas of `live` this map can serve, in `live` order.
    ///
    /// A lazy map can serve every live replica; an eager map only those it holds.
    pub fn usable(&self, live: &ReplicaSet) -> Vec<Replica> {
        if self.is_lazy() {
            return live.as_slice().to_vec();
        }
        let handles = self.lock();
        live.iter()
            .filter(|r| handles.contains_key(*r))
            .cloned()
            .collect()
    }

    /// Existing handle for `replica`, creating it first for lazy maps.
    ///
    /// `Ok(None)` means the map cannot serve the replica: it is absent from an
    /// eager map, or it was deactivated while its handle was being created.
    pub async fn resolve(&self, cluster: &Cluster, replica: &Replica) -> Result<Option<Arc<H>>, NativeError> {
        if let Some(handle) = self.get(replica) {
            return Ok(Some(handle));
        }
        let factory = match &self.factory {
            Some(factory) => factory,
            None => return Ok(None),
        };

        let created = Arc::new(factory(replica.clone()).await?);

        let inserted = cluster.critical_section(|live| {
            if !live.contains(replica) {
                return Err(created);
            }
            let mut handles = self.lock();
            if let Some(existing) = handles.get(replica) {
                return Ok((existing.clone(), Some(created)));
            }
            handles.insert(replica.clone(), created.clone());
            Ok((created, None))
        });

        match inserted {
            Ok((handle, redundant)) => {
                if let Some(redundant) = redundant {
                    release(cluster.name(), vec![(replica.clone(), redundant)]).await;
                }
                Ok(Some(handle))
            }
            Err(stale) => {
                tracing::debug!(
                    cluster = %cluster.name(),
                    replica = %replica,
                    "Replica deactivated during lazy creation, discarding handle"
                );
                release(cluster.name(), vec![(replica.clone(), stale)]).await;
                Ok(None)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Replica, Arc<H>>> {
        self.handles.lock()
    }
}

impl<H> fmt::Debug for ResourceMap<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let replicas: Vec<String> = self.handles.lock().keys().map(|r| r.id().to_string()).collect();
        f.debug_struct("ResourceMap")
            .field("replicas", &replicas)
            .field("lazy", &self.factory.is_some())
            .finish()
    }
}

/// Close handles that are no longer reachable. Errors are logged only.
pub(crate) async fn release<H: NativeHandle>(cluster: &str, handles: Vec<(Replica, Arc<H>)>) {
    for (replica, handle) in handles {
        if let Err(e) = handle.close().await {
            tracing::debug!(
                cluster = %cluster,
                replica = %replica,
                error = %e,
                "Failed to close native handle"
            );
        }
    }
}
