//! Shutdown coordination for the supervisor.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks (health monitor,
/// admin server, membership listener) subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for `tasks` to finish, aborting whatever is left after `deadline`.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, deadline: Duration) {
        let pending = tasks.len();
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();

        let joined = tokio::time::timeout(deadline, async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Background task ended abnormally");
                }
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!(
                pending,
                deadline_secs = deadline.as_secs(),
                "Shutdown deadline reached, aborting remaining tasks"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
