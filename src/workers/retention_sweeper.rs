use std::time::Duration;
use tracing::Instrument;

use crate::adapters::database::job_repo::JobRepository;

/// Deletes terminal jobs (`Succeeded`/`Failed`/`Cancelled`) past their
/// retention window so the jobs table doesn't grow unbounded. Cancelled jobs
/// are swept on the same schedule as failed jobs.
#[derive(Debug)]
pub struct RetentionSweeperWorker {
    repo: JobRepository,
    interval_secs: u64,
    succeeded_retention_secs: i64,
    failed_retention_secs: i64,
}

impl RetentionSweeperWorker {
    #[must_use]
    pub const fn new(repo: JobRepository, interval_secs: u64, succeeded_retention_secs: i64, failed_retention_secs: i64) -> Self {
        Self { repo, interval_secs, succeeded_retention_secs, failed_retention_secs }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if self.interval_secs == 0 {
            tracing::info!("Retention sweeper is disabled (interval = 0)");
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().instrument(tracing::info_span!("run_retention_sweeper")).await;
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Retention sweeper shutting down...");
    }

    async fn sweep(&self) {
        match self.repo.sweep_retention(self.succeeded_retention_secs, self.failed_retention_secs).await {
            Ok(count) if count > 0 => tracing::info!(count, "Swept terminal jobs past retention"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Failed to sweep job retention"),
        }
    }
}
