use std::time::Duration;
use tracing::Instrument;

use crate::adapters::database::job_repo::JobRepository;
use crate::services::event_bus::EventBus;

/// Reclaims jobs whose lease expired without the owning worker renewing it
/// (a crashed or stalled worker) by flipping them back to `Queued`, and
/// sweeps the Event Bus's per-owner channels that have gone idle. Grounded
/// on the same fixed-interval cleanup shape as the other background workers,
/// just pointed at two unrelated pieces of upkeep that both want to run
/// "every so often" and don't justify their own worker each.
#[derive(Debug)]
pub struct LeaseReaperWorker {
    repo: JobRepository,
    bus: EventBus,
    interval_secs: u64,
}

impl LeaseReaperWorker {
    #[must_use]
    pub const fn new(repo: JobRepository, bus: EventBus, interval_secs: u64) -> Self {
        Self { repo, bus, interval_secs }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if self.interval_secs == 0 {
            tracing::info!("Lease reaper is disabled (interval = 0)");
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    self.reap().instrument(tracing::info_span!("run_lease_reaper")).await;
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Lease reaper shutting down...");
    }

    async fn reap(&self) {
        match self.repo.reclaim_expired_leases().await {
            Ok(count) if count > 0 => tracing::info!(count, "Reclaimed jobs with expired leases"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Failed to reclaim expired leases"),
        }
        self.bus.sweep_idle_channels();
    }
}
