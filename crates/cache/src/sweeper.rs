//! Periodic eviction sweeper.

use crate::registry::CacheRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Periodic clean-up driver for every cache in a registry.
///
/// One background task ticks on a fixed period and runs each cache's
/// `clean_up()`; per-run stats are logged. `clean_up()` stays safe to call
/// on demand alongside the sweeper.
pub struct Sweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Sweeper {
    /// Spawn the sweep loop. The first sweep runs immediately, then on every
    /// period tick.
    pub fn spawn(registry: Arc<CacheRegistry>, period: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        run_sweep(&registry).await;
                    }
                    _ = rx.changed() => break,
                }
            }
            tracing::debug!("sweeper stopped");
        });

        Self { handle, shutdown }
    }

    /// Stop the sweep loop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn run_sweep(registry: &CacheRegistry) {
    for target in registry.sweep_targets() {
        match target.clean_up().await {
            Ok(stats) if stats.errors > 0 => {
                tracing::warn!(
                    cache = target.name(),
                    removed = stats.removed(),
                    errors = stats.errors,
                    "sweep finished with errors"
                );
            }
            Ok(stats) => {
                if stats.removed() > 0 {
                    tracing::info!(
                        cache = target.name(),
                        expired = stats.expired,
                        evicted = stats.evicted,
                        idle = stats.idle,
                        "sweep evicted entries"
                    );
                }
            }
            Err(e) => {
                tracing::error!(cache = target.name(), error = %e, "sweep failed");
            }
        }
    }
}
