use async_trait::async_trait;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::Instrument;

use crate::adapters::database::job_repo::{JobRepository, LeasedJob};
use crate::adapters::generation::{Generator, ProgressSink};
use crate::config::JobConfig;
use crate::domain::event::JobEvent;
use crate::domain::job::{JobKind, ProgressStage};
use crate::services::event_bus::EventBus;
use crate::workers::retry_policy::RetryPolicy;

#[derive(Clone, Debug)]
struct Metrics {
    leased: Counter<u64>,
    succeeded: Counter<u64>,
    retried: Counter<u64>,
    failed_terminal: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fableforge-server");
        Self {
            leased: meter.u64_counter("job_leased_total").with_description("Jobs leased by a worker pool").build(),
            succeeded: meter.u64_counter("job_succeeded_total").with_description("Jobs that reached Succeeded").build(),
            retried: meter.u64_counter("job_retried_total").with_description("Attempts that ended in a scheduled retry").build(),
            failed_terminal: meter.u64_counter("job_failed_total").with_description("Jobs that reached terminal Failed").build(),
        }
    }
}

/// Bounded-concurrency worker pool for one job kind. Polls `LeaseNext` on a
/// fixed interval and on an immediate wakeup (`Enqueue`/lease-expiry nudge),
/// dispatches each leased job to its own task under a semaphore permit, and
/// reports progress/outcome back through the Job Store and Event Bus.
#[derive(Clone, Debug)]
pub struct JobWorkerPool {
    kind: JobKind,
    repo: JobRepository,
    bus: EventBus,
    generator: Arc<dyn Generator>,
    notifier: Arc<Notify>,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
    lease_visibility_timeout_secs: i64,
    retry_policy: RetryPolicy,
    metrics: Metrics,
}

impl JobWorkerPool {
    #[must_use]
    pub fn new(
        kind: JobKind,
        repo: JobRepository,
        bus: EventBus,
        generator: Arc<dyn Generator>,
        notifier: Arc<Notify>,
        config: &JobConfig,
    ) -> Self {
        Self {
            kind,
            repo,
            bus,
            generator,
            notifier,
            semaphore: Arc::new(Semaphore::new(config.concurrency_for(kind))),
            poll_interval: Duration::from_secs(config.worker_poll_interval_secs),
            lease_visibility_timeout_secs: config.lease_visibility_timeout_secs,
            retry_policy: RetryPolicy::from_config(config),
            metrics: Metrics::new(),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    self.poll_and_dispatch().instrument(tracing::debug_span!("poll_and_dispatch", kind = %self.kind)).await;
                }
                () = self.notifier.notified() => {
                    self.poll_and_dispatch().instrument(tracing::debug_span!("poll_and_dispatch_nudge", kind = %self.kind)).await;
                }
            }
        }
        tracing::info!(kind = %self.kind, "Worker pool shutting down...");
    }

    async fn poll_and_dispatch(&self) {
        let available = self.semaphore.available_permits();
        if available == 0 {
            return;
        }

        let leased = match self.repo.lease_next(self.kind, available as i64, self.lease_visibility_timeout_secs).await {
            Ok(leased) => leased,
            Err(e) => {
                tracing::error!(error = %e, kind = %self.kind, "Failed to lease jobs");
                return;
            }
        };

        if leased.is_empty() {
            return;
        }
        tracing::info!(count = leased.len(), kind = %self.kind, "Leased jobs for processing");
        self.metrics.leased.add(leased.len() as u64, &[KeyValue::new("kind", self.kind.as_str())]);

        for job in leased {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                // Another task already claimed every permit between the availability
                // check and here; the job stays leased and will be retried after its
                // visibility timeout elapses.
                continue;
            };

            let worker = self.clone();
            tokio::spawn(
                async move {
                    let _permit = permit;
                    worker.run_job(job).await;
                }
                .instrument(tracing::info_span!("run_job")),
            );
        }
    }

    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id, owner_id = %job.owner_id))]
    async fn run_job(&self, job: LeasedJob) {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        let renew_repo = self.repo.clone();
        let renew_job_id = job.job_id;
        let renew_timeout = self.lease_visibility_timeout_secs;
        let renew_handle = tokio::spawn(async move {
            let half = Duration::from_secs(u64::try_from(renew_timeout / 2).unwrap_or(1).max(1));
            let mut interval = tokio::time::interval(half);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let _ = renew_repo.renew_lease(renew_job_id, renew_timeout).await;
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        let sink = RepoProgressSink {
            repo: self.repo.clone(),
            bus: self.bus.clone(),
            job_id: job.job_id,
            owner_id: job.owner_id,
            kind: job.kind,
        };

        let outcome = self.generator.generate(&job.payload, &sink).await;
        let _ = stop_tx.send(());
        let _ = renew_handle.await;

        match outcome {
            Ok(result) => match self.repo.complete(job.job_id, &result).await {
                Ok(true) => {
                    self.metrics.succeeded.add(1, &[KeyValue::new("kind", job.kind.as_str())]);
                    self.bus.publish(JobEvent::Succeeded { job_id: job.job_id, owner_id: job.owner_id, kind: job.kind, result });
                }
                Ok(false) => tracing::warn!("Job was no longer processing; dropping stale completion"),
                Err(e) => tracing::error!(error = %e, "Failed to record job completion"),
            },
            Err(err) => {
                let error_kind = self.retry_policy.classify(&err);
                let message = err.message().to_string();
                match self
                    .repo
                    .fail(
                        job.job_id,
                        error_kind,
                        &message,
                        self.retry_policy.base_delay_secs,
                        self.retry_policy.factor,
                        self.retry_policy.max_delay_secs,
                    )
                    .await
                {
                    Ok(true) => {
                        self.metrics.failed_terminal.add(1, &[KeyValue::new("kind", job.kind.as_str())]);
                        self.bus.publish(JobEvent::Failed {
                            job_id: job.job_id,
                            owner_id: job.owner_id,
                            kind: job.kind,
                            error: crate::domain::job::JobError { kind: error_kind, message },
                        });
                    }
                    Ok(false) => {
                        self.metrics.retried.add(1, &[KeyValue::new("kind", job.kind.as_str())]);
                        self.notifier.notify_one();
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to record job failure"),
                }
            }
        }
    }
}

/// Bridges a `Generator`'s progress callback to the Job Store and Event Bus.
#[derive(Clone, Debug)]
struct RepoProgressSink {
    repo: JobRepository,
    bus: EventBus,
    job_id: uuid::Uuid,
    owner_id: uuid::Uuid,
    kind: JobKind,
}

#[async_trait]
impl ProgressSink for RepoProgressSink {
    async fn report(&self, stage: ProgressStage) {
        if let Err(e) = self.repo.report_progress(self.job_id, stage).await {
            tracing::error!(error = %e, job_id = %self.job_id, "Failed to record progress");
        }
        self.bus.publish(JobEvent::Progress {
            job_id: self.job_id,
            owner_id: self.owner_id,
            kind: self.kind,
            stage,
            percent: stage.percent(),
        });
    }
}
