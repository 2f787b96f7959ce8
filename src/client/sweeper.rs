//! Background eviction of idle upstream clients.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::CleanupTimerConfig;

use super::cache::ClientCache;

pub struct IdleSweeper {
    cache: Arc<ClientCache>,
    config: CleanupTimerConfig,
}

impl IdleSweeper {
    pub fn new(cache: Arc<ClientCache>, config: CleanupTimerConfig) -> Self {
        Self { cache, config }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Sweep after `delay_secs`, then every `period_secs`, until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let delay = Duration::from_secs(self.config.delay_secs);
        let period = Duration::from_secs(self.config.period_secs);
        let threshold = Duration::from_secs(self.config.remove_threshold_secs);

        tracing::info!(
            delay_secs = self.config.delay_secs,
            period_secs = self.config.period_secs,
            remove_threshold_secs = self.config.remove_threshold_secs,
            "Idle client sweeper starting"
        );

        let mut ticker = time::interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.cache.evict_idle(threshold);
                    if evicted > 0 {
                        tracing::info!(evicted, remaining = self.cache.len(), "Evicted idle upstream clients");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Idle client sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
