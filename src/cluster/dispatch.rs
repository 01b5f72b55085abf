//! Operation dispatch across replicas.
//!
//! # Modes
//! ```text
//! Direct:     primary replica only, errors pass through untouched
//! SelectOne:  balancer pick; dead replicas are deactivated and the pick retried
//! Sequential: every replica in order; failures are logged and skipped
//! Broadcast:  every replica concurrently, joined before returning;
//!             dead replicas deactivated, any other failure surfaced
//! ```
//!
//! # Design Decisions
//! - Each Broadcast unit classifies its own failure before reporting, so the
//!   join is a barrier: no unit is still running when the call returns
//! - The live set is snapshotted once per call; a replica removed mid-call is
//!   simply absent from the next snapshot

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tokio::task::JoinSet;

use crate::cluster::error::{ClusterError, ClusterResult};
use crate::cluster::failure::FailureCoordinator;
use crate::cluster::registry::Cluster;
use crate::cluster::resources::{release, ResourceMap};
use crate::driver::{NativeError, NativeHandle};
use crate::load_balancer::LoadGuard;
use crate::observability::metrics;
use crate::replica::Replica;
use crate::resilience::run_bounded;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// The first live replica, in configuration order, that the resources can serve.
    ///
    /// The operation runs at most once. If that replica is deactivated while its
    /// lazy handle is being created, the operation has not run yet and the next
    /// live replica becomes the designated one.
    Direct,
    SelectOne,
    Sequential,
    Broadcast,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Direct => "direct",
            DispatchMode::SelectOne => "select_one",
            DispatchMode::Sequential => "sequential",
            DispatchMode::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-replica results of a dispatch.
#[derive(Debug)]
pub struct Outcome<T> {
    results: Vec<(Replica, T)>,
}

impl<T> Outcome<T> {
    fn single(replica: Replica, value: T) -> Self {
        Self {
            results: vec![(replica, value)],
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, replica: &Replica) -> Option<&T> {
        self.results
            .iter()
            .find(|(r, _)| r == replica)
            .map(|(_, value)| value)
    }

    pub fn replicas(&self) -> Vec<Replica> {
        self.results.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Replica, &T)> {
        self.results.iter().map(|(r, value)| (r, value))
    }

    /// Any one result, for callers that only need a representative value.
    pub fn into_any(self) -> Option<T> {
        self.results.into_iter().next().map(|(_, value)| value)
    }

    pub fn into_map(self) -> HashMap<Replica, T> {
        self.results.into_iter().collect()
    }
}

impl<T> IntoIterator for Outcome<T> {
    type Item = (Replica, T);
    type IntoIter = std::vec::IntoIter<(Replica, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

enum UnitReport<T> {
    Completed(T),
    Failed(NativeError),
    Deactivated,
}

/// Everything a Broadcast produced, before it is turned into a result.
struct BroadcastReport<T> {
    results: Vec<(Replica, T)>,
    failure: Option<NativeError>,
    violation: Option<String>,
}

impl<T> BroadcastReport<T> {
    /// On error, also hands back the values produced by the units that completed.
    fn settle(self, cluster: &Cluster) -> Result<Outcome<T>, (ClusterError, Vec<(Replica, T)>)> {
        if let Some(reason) = self.violation {
            return Err((ClusterError::ContractViolation { reason }, self.results));
        }
        if let Some(error) = self.failure {
            return Err((ClusterError::Application(error), self.results));
        }
        if self.results.is_empty() {
            return Err((cluster.exhausted(), self.results));
        }
        Ok(Outcome { results: self.results })
    }
}

fn outcome_label<T>(result: &ClusterResult<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(ClusterError::ClusterExhausted(_)) => "exhausted",
        Err(ClusterError::Application(_)) => "application_error",
        Err(_) => "error",
    }
}

impl Cluster {
    /// Run `operation` against the replicas of `resources` according to `mode`.
    pub async fn dispatch<H, T, F, Fut>(
        self: &Arc<Self>,
        mode: DispatchMode,
        resources: &ResourceMap<H>,
        operation: F,
    ) -> ClusterResult<Outcome<T>>
    where
        H: NativeHandle,
        T: Send + 'static,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, NativeError>> + Send + 'static,
    {
        let start = Instant::now();
        let result = match mode {
            DispatchMode::Direct => self.dispatch_direct(resources, operation).await,
            DispatchMode::SelectOne => self.dispatch_select_one(resources, operation).await,
            DispatchMode::Sequential => self.dispatch_sequential(resources, operation).await,
            DispatchMode::Broadcast => self.dispatch_broadcast(resources, Arc::new(operation)).await,
        };

        metrics::record_dispatch(self.name(), mode.as_str(), outcome_label(&result), start);
        result
    }

    /// Broadcast `create` and collect the produced handles into an eager map.
    ///
    /// If the Broadcast fails, handles already created on other replicas are closed
    /// before the error is returned.
    pub(crate) async fn populate<H, C, F, Fut>(
        self: &Arc<Self>,
        resources: &ResourceMap<H>,
        create: F,
    ) -> ClusterResult<ResourceMap<C>>
    where
        H: NativeHandle,
        C: NativeHandle,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, NativeError>> + Send + 'static,
    {
        let start = Instant::now();
        let result = match self.run_broadcast(resources, Arc::new(create)).await {
            Ok(report) => match report.settle(self) {
                Ok(outcome) => Ok(ResourceMap::eager(outcome)),
                Err((error, created)) => {
                    if !created.is_empty() {
                        tracing::debug!(
                            cluster = %self.name(),
                            created = created.len(),
                            "Population failed, releasing handles already created"
                        );
                        let created = created.into_iter().map(|(r, h)| (r, Arc::new(h))).collect();
                        release(self.name(), created).await;
                    }
                    Err(error)
                }
            },
            Err(error) => Err(error),
        };
        metrics::record_dispatch(self.name(), DispatchMode::Broadcast.as_str(), outcome_label(&result), start);
        result
    }

    fn exhausted(&self) -> ClusterError {
        ClusterError::ClusterExhausted(self.name().to_string())
    }

    // `Ok(None)` from `resolve` means the replica left the live set before the
    // operation ran, so moving on still runs the operation at most once.
    async fn dispatch_direct<H, T, F, Fut>(&self, resources: &ResourceMap<H>, operation: F) -> ClusterResult<Outcome<T>>
    where
        H: NativeHandle,
        F: Fn(Replica, Arc<H>) -> Fut,
        Fut: Future<Output = Result<T, NativeError>>,
    {
        let live = self.live_replicas();
        for replica in resources.usable(&live) {
            let handle = match resources.resolve(self, &replica).await {
                Ok(Some(handle)) => handle,
                Ok(None) => continue,
                Err(e) => return Err(ClusterError::Application(e)),
            };
            return match operation(replica.clone(), handle).await {
                Ok(value) => Ok(Outcome::single(replica, value)),
                Err(e) => Err(ClusterError::Application(e)),
            };
        }
        Err(self.exhausted())
    }

    async fn dispatch_select_one<H, T, F, Fut>(&self, resources: &ResourceMap<H>, operation: F) -> ClusterResult<Outcome<T>>
    where
        H: NativeHandle,
        F: Fn(Replica, Arc<H>) -> Fut,
        Fut: Future<Output = Result<T, NativeError>>,
    {
        // Every failed attempt removes one replica, so the initial size bounds the retries.
        let attempts = self.live_replicas().len();
        for _ in 0..attempts {
            let live = self.live_replicas();
            let candidates = resources.usable(&live);
            let replica = match self.balancer().next_replica(&candidates) {
                Some(replica) => replica,
                None => break,
            };

            let result = {
                let _load = LoadGuard::new(self.balancer(), replica.clone());
                match resources.resolve(self, &replica).await {
                    Ok(Some(handle)) => run_bounded(self.unit_timeout(), operation(replica.clone(), handle)).await,
                    Ok(None) => continue,
                    Err(e) => Err(e),
                }
            };

            match result {
                Ok(value) => return Ok(Outcome::single(replica, value)),
                Err(error) => match FailureCoordinator::resolve(self, &replica, error).await {
                    Some(error) => return Err(ClusterError::Application(error)),
                    None => {
                        tracing::debug!(
                            cluster = %self.name(),
                            replica = %replica,
                            "Retrying operation on remaining replicas"
                        );
                    }
                },
            }
        }
        Err(self.exhausted())
    }

    async fn dispatch_sequential<H, T, F, Fut>(&self, resources: &ResourceMap<H>, operation: F) -> ClusterResult<Outcome<T>>
    where
        H: NativeHandle,
        F: Fn(Replica, Arc<H>) -> Fut,
        Fut: Future<Output = Result<T, NativeError>>,
    {
        let live = self.live_replicas();
        let replicas = resources.usable(&live);
        if replicas.is_empty() {
            return Err(self.exhausted());
        }

        let mut results = Vec::with_capacity(replicas.len());
        for replica in replicas {
            let handle = match resources.resolve(self, &replica).await {
                Ok(Some(handle)) => handle,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(cluster = %self.name(), replica = %replica, error = %e, "Sequential unit skipped");
                    continue;
                }
            };
            match operation(replica.clone(), handle).await {
                Ok(value) => results.push((replica, value)),
                Err(e) => {
                    tracing::warn!(cluster = %self.name(), replica = %replica, error = %e, "Sequential unit skipped");
                }
            }
        }
        Ok(Outcome { results })
    }

    async fn dispatch_broadcast<H, T, F, Fut>(
        self: &Arc<Self>,
        resources: &ResourceMap<H>,
        operation: Arc<F>,
    ) -> ClusterResult<Outcome<T>>
    where
        H: NativeHandle,
        T: Send + 'static,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, NativeError>> + Send + 'static,
    {
        self.run_broadcast(resources, operation)
            .await?
            .settle(self)
            .map_err(|(error, _)| error)
    }

    /// Run one unit per usable replica and join them all.
    ///
    /// Fails up front only when no live replica is usable.
    async fn run_broadcast<H, T, F, Fut>(
        self: &Arc<Self>,
        resources: &ResourceMap<H>,
        operation: Arc<F>,
    ) -> ClusterResult<BroadcastReport<T>>
    where
        H: NativeHandle,
        T: Send + 'static,
        F: Fn(Replica, Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, NativeError>> + Send + 'static,
    {
        let live = self.live_replicas();
        let replicas = resources.usable(&live);
        if replicas.is_empty() {
            return Err(self.exhausted());
        }

        let cluster: &Cluster = self;
        let handles = join_all(replicas.iter().map(|r| resources.resolve(cluster, r))).await;

        let mut units = JoinSet::new();
        for (replica, handle) in replicas.into_iter().zip(handles) {
            let handle = match handle {
                Ok(Some(handle)) => Ok(handle),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            let cluster = Arc::clone(self);
            let operation = Arc::clone(&operation);

            units.spawn(async move {
                let result = match handle {
                    Ok(handle) => run_bounded(cluster.unit_timeout(), (*operation)(replica.clone(), handle)).await,
                    Err(e) => Err(e),
                };
                let report = match result {
                    Ok(value) => UnitReport::Completed(value),
                    Err(error) => match FailureCoordinator::resolve(&cluster, &replica, error).await {
                        Some(error) => UnitReport::Failed(error),
                        None => UnitReport::Deactivated,
                    },
                };
                (replica, report)
            });
        }

        let mut results = Vec::new();
        let mut failure: Option<NativeError> = None;
        let mut violation: Option<String> = None;

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((replica, UnitReport::Completed(value))) => results.push((replica, value)),
                Ok((replica, UnitReport::Failed(error))) => {
                    tracing::warn!(
                        cluster = %self.name(),
                        replica = %replica,
                        error = %error,
                        "Broadcast unit failed on a live replica"
                    );
                    if failure.is_none() {
                        failure = Some(error);
                    }
                }
                Ok((_, UnitReport::Deactivated)) => {}
                Err(e) => {
                    tracing::error!(cluster = %self.name(), error = %e, "Broadcast unit did not report");
                    violation.get_or_insert_with(|| e.to_string());
                }
            }
        }

        Ok(BroadcastReport {
            results,
            failure,
            violation,
        })
    }
}
