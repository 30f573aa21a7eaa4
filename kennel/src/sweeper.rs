use std::sync::Arc;
use std::time::Duration;

use kennel_core::{KennelError, KennelResult};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::connections::ConnectionRegistry;
use crate::storage::StorageClientRegistry;

/// Outcome of one sweep cycle over a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub inspected: usize,
    pub evicted: usize,
    /// Evicted entries whose close call failed.
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub connection_interval: Duration,
    pub connection_idle: Duration,
    pub storage_interval: Duration,
    pub storage_idle: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            connection_interval: Duration::from_secs(20 * 60),
            connection_idle: Duration::from_secs(20 * 60),
            storage_interval: Duration::from_secs(24 * 60 * 60),
            storage_idle: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Idle eviction for both registries.
pub struct EvictionSweeper {
    connections: Arc<ConnectionRegistry>,
    storage: Arc<StorageClientRegistry>,
    config: SweeperConfig,
}

impl EvictionSweeper {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        storage: Arc<StorageClientRegistry>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            connections,
            storage,
            config,
        }
    }

    /// Run one connection sweep cycle (for testing)
    pub async fn sweep_connections(&self) -> SweepReport {
        let report = self.connections.sweep_idle(self.config.connection_idle).await;
        log_report("connections", report);
        report
    }

    /// Run one storage-client sweep cycle (for testing)
    pub fn sweep_storage_clients(&self) -> SweepReport {
        let report = self.storage.sweep_idle(self.config.storage_idle);
        log_report("storage clients", report);
        report
    }

    /// Spawn the two sweep loops. They run until the handle is shut down.
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        info!(
            connection_interval = ?self.config.connection_interval,
            storage_interval = ?self.config.storage_interval,
            "starting eviction sweeper"
        );

        let connections = {
            let sweeper = self.clone();
            spawn_loop(self.config.connection_interval, move || {
                let sweeper = sweeper.clone();
                async move {
                    sweeper.sweep_connections().await;
                }
            })
        };
        let storage = {
            let sweeper = self.clone();
            spawn_loop(self.config.storage_interval, move || {
                let sweeper = sweeper.clone();
                async move {
                    sweeper.sweep_storage_clients();
                }
            })
        };

        SweeperHandle {
            loops: vec![connections, storage],
        }
    }
}

fn log_report(registry: &str, report: SweepReport) {
    if report.failed > 0 {
        warn!(registry, inspected = report.inspected, evicted = report.evicted, failed = report.failed, "sweep finished with failures");
    } else if report.evicted > 0 {
        info!(registry, inspected = report.inspected, evicted = report.evicted, "sweep evicted idle entries");
    } else {
        debug!(registry, inspected = report.inspected, "sweep found nothing idle");
    }
}

struct SweepLoop {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

fn spawn_loop<F, Fut>(period: Duration, mut cycle: F) -> SweepLoop
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let join_handle = tokio::spawn(async move {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so nothing is swept at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => cycle().await,
            }
        }
    });
    SweepLoop {
        shutdown_tx,
        join_handle,
    }
}

/// Handle for stopping a running [`EvictionSweeper`]. Dropping it also
/// stops the loops.
pub struct SweeperHandle {
    loops: Vec<SweepLoop>,
}

impl SweeperHandle {
    /// Stop both loops and wait for them. A sweep in progress finishes first.
    pub async fn shutdown(self) -> KennelResult<()> {
        let mut joins = Vec::with_capacity(self.loops.len());
        for sweep in self.loops {
            let _ = sweep.shutdown_tx.send(());
            joins.push(sweep.join_handle);
        }
        for join in joins {
            join.await
                .map_err(|e| KennelError::internal(format!("sweeper join error: {}", e)))?;
        }
        info!("eviction sweeper stopped");
        Ok(())
    }
}
