//! Membership notifier publishing deactivations to other processes.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::membership::{MembershipEvent, MembershipNotifier, Transport};
use crate::observability::metrics;
use crate::replica::Replica;

/// Queues announcements for a background publisher task.
///
/// `announce` is called inside the cluster critical section, so it only
/// enqueues; delivery failures are logged and never reach the caller.
pub struct DistributedMembership {
    origin: Uuid,
    outbound: mpsc::UnboundedSender<MembershipEvent>,
}

impl DistributedMembership {
    /// Start the publisher task. It stops once the notifier is dropped.
    pub fn spawn(origin: Uuid, transport: Arc<dyn Transport>, topic: String) -> Self {
        let (outbound, mut queue) = mpsc::unbounded_channel::<MembershipEvent>();

        tokio::spawn(async move {
            while let Some(event) = queue.recv().await {
                let payload = match serde_json::to_vec(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode membership event");
                        continue;
                    }
                };

                match transport.publish(&topic, payload).await {
                    Ok(()) => {
                        tracing::debug!(
                            cluster = %event.cluster,
                            replica = %event.replica,
                            "Published deactivation"
                        );
                        metrics::record_membership_publish(true);
                    }
                    Err(e) => {
                        tracing::warn!(
                            cluster = %event.cluster,
                            replica = %event.replica,
                            error = %e,
                            "Failed to publish deactivation, peers will keep the replica until they detect it"
                        );
                        metrics::record_membership_publish(false);
                    }
                }
            }
            tracing::debug!(topic = %topic, "Membership publisher stopped");
        });

        Self { origin, outbound }
    }

    pub fn origin(&self) -> Uuid {
        self.origin
    }
}

impl MembershipNotifier for DistributedMembership {
    fn announce(&self, cluster: &str, replica: &Replica) {
        let event = MembershipEvent::new(self.origin, cluster, replica.id().clone());
        if self.outbound.send(event).is_err() {
            tracing::warn!(cluster = %cluster, replica = %replica, "Membership publisher is gone, announcement dropped");
        }
    }
}

impl fmt::Debug for DistributedMembership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedMembership")
            .field("origin", &self.origin)
            .finish()
    }
}
