//! Periodic removal of publish-only filters

use std::sync::Arc;
use std::time::Duration;

use hushwire_core::FilterSelector;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

/// Background task that sweeps publish-only filters on a fixed interval.
///
/// Ticks run one at a time on the task itself. Stopping lets a sweep in
/// progress finish and prevents any further tick. Dropping the janitor
/// cancels the loop without waiting for it.
pub struct FilterJanitor {
    shutdown: DropGuard,
    handle: JoinHandle<()>,
}

impl FilterJanitor {
    /// Spawn the janitor loop. The first sweep happens one `interval` after
    /// spawning.
    pub fn spawn(
        selector: Arc<dyn FilterSelector>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            info!("Filter janitor started, interval {:?}", interval);
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("Removing publish-only filters");
                        if let Err(e) = selector.remove_non_listen_filters().await {
                            error!("Failed to clean filters: {}", e);
                        }
                    }
                }
            }
            info!("Filter janitor stopped");
        });

        Self {
            shutdown: shutdown.drop_guard(),
            handle,
        }
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(self) {
        let FilterJanitor { shutdown, handle } = self;
        shutdown.disarm().cancel();
        if let Err(e) = handle.await {
            error!("Filter janitor task failed: {}", e);
        }
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
