use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::adapters::database::job_repo::JobRepository;
use crate::config::JobConfig;
use crate::domain::event::JobEvent;
use crate::domain::job::{Job, JobKind, JobPayload, JobPriority, JobState};
use crate::error::{AppError, Result};
use crate::services::event_bus::EventBus;

/// Per-kind wakeup so a worker pool's `LeaseNext` loop doesn't only poll on
/// a fixed interval: `Enqueue` and lease-expiry nudge the relevant kind's
/// workers immediately. The interval remains as a fallback for jobs that
/// become due on their own (retry backoff elapsing) without a fresh nudge.
#[derive(Clone, Debug, Default)]
pub struct KindNotifiers {
    inner: Arc<DashMap<JobKind, Arc<Notify>>>,
}

impl KindNotifiers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn waiter(&self, kind: JobKind) -> Arc<Notify> {
        Arc::clone(self.inner.entry(kind).or_insert_with(|| Arc::new(Notify::new())).value())
    }

    pub fn wake(&self, kind: JobKind) {
        self.waiter(kind).notify_one();
    }
}

/// Read-model row backing the `Stats` operation: queue depth per kind plus
/// an estimate of how long a newly submitted job of that kind would wait.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindQueueStats {
    pub kind: JobKind,
    pub queued: i64,
    pub processing: i64,
    pub estimated_wait_seconds: f64,
}

/// Facade the HTTP layer calls into: validates, delegates to the Job Store,
/// and publishes the resulting lifecycle event onto the Event Bus. Workers
/// talk to `JobRepository` directly — only owner-facing operations go
/// through here.
#[derive(Clone, Debug)]
pub struct JobService {
    repo: JobRepository,
    bus: EventBus,
    notifiers: KindNotifiers,
    config: JobConfig,
}

impl JobService {
    #[must_use]
    pub const fn new(repo: JobRepository, bus: EventBus, notifiers: KindNotifiers, config: JobConfig) -> Self {
        Self { repo, bus, notifiers, config }
    }

    /// Validates and enqueues a new job, then publishes `Submitted` and
    /// wakes the relevant worker pool.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the payload fails validation,
    /// otherwise propagates database errors.
    #[tracing::instrument(skip(self, payload), err)]
    pub async fn submit(&self, owner_id: Uuid, payload: JobPayload, priority: JobPriority) -> Result<(Uuid, f64)> {
        payload.validate().map_err(AppError::Validation)?;

        let kind = payload.kind();
        let job_id = self.repo.enqueue(owner_id, &payload, priority, self.config.max_attempts).await?;

        self.bus.publish(JobEvent::Submitted { job_id, owner_id, kind });
        self.notifiers.wake(kind);

        let estimated_wait_seconds = self.estimate_wait(kind).await?;
        Ok((job_id, estimated_wait_seconds))
    }

    /// Estimates how long a newly submitted job of `kind` would wait,
    /// `queue_depth / effective_concurrency * avg_job_duration_secs`.
    ///
    /// # Errors
    /// Propagates database errors.
    async fn estimate_wait(&self, kind: JobKind) -> Result<f64> {
        let kind_stats = self.repo.kind_stats().await?;
        let queued = kind_stats.iter().find(|row| row.kind == kind).map_or(0, |row| row.queued);
        let avg_duration_secs = self.repo.avg_duration_secs(kind, 50).await?;
        let concurrency = self.config.concurrency_for(kind).max(1);
        #[allow(clippy::cast_precision_loss)]
        Ok((queued as f64 / concurrency as f64) * avg_duration_secs)
    }

    /// Fetches one job's status, scoped to its owner.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the job doesn't exist, or
    /// `AppError::Authorization` if it exists but isn't owned by
    /// `owner_id`.
    #[tracing::instrument(skip(self), err)]
    pub async fn status(&self, owner_id: Uuid, job_id: Uuid) -> Result<Job> {
        let job = self.repo.get(job_id).await?;
        if !job.is_owned_by(owner_id) {
            return Err(AppError::Authorization);
        }
        Ok(job)
    }

    /// Cancels a job if it is still `Queued`. Only `Queued` jobs may be
    /// cancelled; a `Processing` job runs to completion or failure on its
    /// own (§4.3) and a terminal job has nothing left to cancel.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the job doesn't exist,
    /// `AppError::Authorization` if it exists but isn't owned by
    /// `owner_id`, and `AppError::Conflict` with `"already processing"` or
    /// `"already finished"` otherwise.
    #[tracing::instrument(skip(self), err)]
    pub async fn cancel(&self, owner_id: Uuid, job_id: Uuid) -> Result<()> {
        let job = self.repo.get(job_id).await?;
        if !job.is_owned_by(owner_id) {
            return Err(AppError::Authorization);
        }
        match job.state {
            JobState::Queued => {}
            JobState::Processing => return Err(AppError::Conflict("already processing".to_string())),
            JobState::Succeeded | JobState::Failed | JobState::Cancelled => {
                return Err(AppError::Conflict("already finished".to_string()));
            }
        }

        let cancelled = self.repo.cancel(job_id).await?;
        if cancelled {
            self.bus.publish(JobEvent::Cancelled { job_id, owner_id, kind: job.kind });
        }
        Ok(())
    }

    /// Fetches the artifact reference for a succeeded job, scoped to its
    /// owner. Only valid once the job has reached `Succeeded`; the result
    /// itself is subject to the same retention window the retention-sweeper
    /// enforces, so a job that is `Succeeded` but past its window is
    /// reported `Gone` rather than returning a result that is about to (or
    /// already did) disappear from the store.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the job doesn't exist,
    /// `AppError::Authorization` if it exists but isn't owned by
    /// `owner_id`, `AppError::Conflict` if it hasn't reached a terminal
    /// state yet, and `AppError::Gone` if the result has passed its
    /// retention window.
    #[tracing::instrument(skip(self), err)]
    pub async fn result(&self, owner_id: Uuid, job_id: Uuid) -> Result<crate::domain::job::JobResult> {
        let job = self.repo.get(job_id).await?;
        if !job.is_owned_by(owner_id) {
            return Err(AppError::Authorization);
        }
        match job.state {
            JobState::Succeeded => {}
            JobState::Queued | JobState::Processing => {
                return Err(AppError::Conflict("not yet terminal".to_string()));
            }
            JobState::Failed | JobState::Cancelled => {
                return Err(AppError::Conflict("job did not succeed".to_string()));
            }
        }

        let result = job.result.ok_or(AppError::Internal)?;
        if let Some(finished_at) = job.finished_at {
            let age = time::OffsetDateTime::now_utc() - finished_at;
            if age.whole_seconds() >= self.config.succeeded_retention_secs {
                return Err(AppError::Gone("result has expired".to_string()));
            }
        }
        Ok(result)
    }

    /// Lists an owner's in-flight (queued or processing) jobs.
    ///
    /// # Errors
    /// Propagates database errors.
    #[tracing::instrument(skip(self), err)]
    pub async fn list_pending(&self, owner_id: Uuid) -> Result<Vec<Job>> {
        self.repo.list_owner_pending(owner_id).await
    }

    /// Builds the queue-depth-and-wait-estimate snapshot for every job kind.
    ///
    /// # Errors
    /// Propagates database errors.
    #[tracing::instrument(skip(self), err)]
    pub async fn stats(&self) -> Result<Vec<KindQueueStats>> {
        let kind_stats = self.repo.kind_stats().await?;
        let mut rows = Vec::with_capacity(JobKind::ALL.len());

        for kind in JobKind::ALL {
            let (queued, processing) = kind_stats
                .iter()
                .find(|row| row.kind == kind)
                .map_or((0, 0), |row| (row.queued, row.processing));

            let estimated_wait_seconds = self.estimate_wait(kind).await?;
            rows.push(KindQueueStats { kind, queued, processing, estimated_wait_seconds });
        }

        Ok(rows)
    }
}
