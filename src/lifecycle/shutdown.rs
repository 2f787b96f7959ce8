//! Shutdown coordination for the proxy.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};

/// Coordinator for graceful shutdown.
///
/// The listener and the idle client sweeper each hold a receiver; one
/// `trigger` stops both.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every subscriber. Safe to call with no subscribers left.
    pub fn trigger(&self) {
        tracing::info!(subscribers = self.tx.receiver_count(), "Triggering shutdown");
        let _ = self.tx.send(());
    }

    /// Number of subscribers that have not dropped their receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait up to `grace` for `task` to finish. `None` means the grace
    /// period ran out; the task is left to die with the runtime.
    pub async fn drain<T>(task: JoinHandle<T>, grace: Duration) -> Option<Result<T, JoinError>> {
        tokio::time::timeout(grace, task).await.ok()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
