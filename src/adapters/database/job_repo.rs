use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::adapters::database::DbPool;
use crate::domain::job::{
    ErrorKind, Job, JobError, JobKind, JobPayload, JobPriority, JobResult, JobState, ProgressStage,
};
use crate::error::{AppError, Result};

/// Per-kind, per-state snapshot backing the `Stats` operation.
#[derive(Debug, Clone, Copy)]
pub struct KindStats {
    pub kind: JobKind,
    pub queued: i64,
    pub processing: i64,
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    owner_id: Uuid,
    kind: String,
    priority: i16,
    payload: serde_json::Value,
    state: String,
    stage: String,
    progress: i16,
    attempts_made: i32,
    max_attempts: i32,
    next_attempt_at: Option<OffsetDateTime>,
    submitted_at: OffsetDateTime,
    leased_at: Option<OffsetDateTime>,
    finished_at: Option<OffsetDateTime>,
    result_artifact_id: Option<String>,
    result_title: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Job {
        let result = match (self.result_artifact_id, self.result_title) {
            (Some(artifact_id), Some(title)) => Some(JobResult { artifact_id, title }),
            _ => None,
        };
        let error = match (self.error_kind, self.error_message) {
            (Some(kind), Some(message)) => {
                ErrorKind::from_str(&kind).map(|kind| JobError { kind, message })
            }
            _ => None,
        };

        Job {
            job_id: self.id,
            owner_id: self.owner_id,
            kind: JobKind::from_str(&self.kind).unwrap_or(JobKind::StoryForPrompt),
            priority: JobPriority::from_i16(self.priority).unwrap_or(JobPriority::Normal),
            state: JobState::from_str(&self.state).unwrap_or(JobState::Queued),
            progress: u8::try_from(self.progress).unwrap_or(0),
            stage: ProgressStage::from_str(&self.stage).unwrap_or(ProgressStage::Queued),
            attempts_made: self.attempts_made,
            max_attempts: self.max_attempts,
            next_attempt_at: self.next_attempt_at,
            submitted_at: self.submitted_at,
            leased_at: self.leased_at,
            finished_at: self.finished_at,
            result,
            error,
        }
    }
}

/// A leased job handed to a worker: enough to run the generator plus the
/// bookkeeping needed to report back.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job_id: Uuid,
    pub owner_id: Uuid,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub attempts_made: i32,
    pub max_attempts: i32,
}

/// Durable job queue backed by Postgres. Leasing is atomic via
/// `SELECT ... FOR UPDATE SKIP LOCKED`, so multiple worker-pool instances can
/// poll the same table concurrently without double-dispatch.
#[derive(Clone, Debug)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts a new job in the `Queued` state.
    ///
    /// # Errors
    /// Returns a database error if the insert fails.
    #[tracing::instrument(skip(self, payload), err)]
    pub async fn enqueue(
        &self,
        owner_id: Uuid,
        payload: &JobPayload,
        priority: JobPriority,
        max_attempts: i32,
    ) -> Result<Uuid> {
        let job_id = Uuid::now_v7();
        let payload_json = serde_json::to_value(payload).map_err(|_| AppError::Internal)?;

        sqlx::query(
            r"
            INSERT INTO jobs (id, owner_id, kind, priority, payload, state, stage, progress, attempts_made, max_attempts, next_attempt_at, submitted_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'queued', 'queued', 0, 0, $6, NOW(), NOW(), NOW())
            ",
        )
        .bind(job_id)
        .bind(owner_id)
        .bind(payload.kind().as_str())
        .bind(priority.as_i16())
        .bind(payload_json)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;

        Ok(job_id)
    }

    /// Atomically leases up to `limit` queued, due jobs of `kind`, ordered by
    /// priority then submission time (FIFO within a priority band).
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn lease_next(
        &self,
        kind: JobKind,
        limit: i64,
        visibility_timeout_secs: i64,
    ) -> Result<Vec<LeasedJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r"
            WITH claimable AS (
                SELECT id
                FROM jobs
                WHERE state = 'queued'
                  AND kind = $1
                  AND next_attempt_at <= NOW()
                ORDER BY priority ASC, submitted_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET state = 'processing',
                stage = 'processing',
                progress = 10,
                leased_at = NOW(),
                lease_expires_at = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            WHERE id IN (SELECT id FROM claimable)
            RETURNING *
            ",
        )
        .bind(kind.as_str())
        .bind(limit)
        .bind(visibility_timeout_secs as f64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload: JobPayload =
                    serde_json::from_value(row.payload.clone()).map_err(|_| AppError::Internal)?;
                Ok(LeasedJob {
                    job_id: row.id,
                    owner_id: row.owner_id,
                    kind,
                    payload,
                    attempts_made: row.attempts_made,
                    max_attempts: row.max_attempts,
                })
            })
            .collect()
    }

    /// Extends a held lease. Called periodically by the worker while a job
    /// runs, so a long-running generation isn't mistaken for a stalled one.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn renew_lease(&self, job_id: Uuid, visibility_timeout_secs: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE jobs
            SET lease_expires_at = NOW() + make_interval(secs => $1), updated_at = NOW()
            WHERE id = $2 AND state = 'processing'
            ",
        )
        .bind(visibility_timeout_secs as f64)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a progress checkpoint. Progress only ever moves forward within
    /// one attempt — the caller is trusted to pass the current pipeline
    /// stage, never a stage behind where it already reported.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn report_progress(&self, job_id: Uuid, stage: ProgressStage) -> Result<()> {
        sqlx::query(
            r"
            UPDATE jobs
            SET stage = $1, progress = $2, updated_at = NOW()
            WHERE id = $3 AND state = 'processing'
            ",
        )
        .bind(stage.as_str())
        .bind(i16::from(stage.percent()))
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a job `Succeeded`. Terminal and sticky: a job already terminal
    /// is left untouched by the `WHERE state = 'processing'` guard.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn complete(&self, job_id: Uuid, result: &JobResult) -> Result<bool> {
        let outcome = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'succeeded', stage = 'completed', progress = 100,
                result_artifact_id = $1, result_title = $2,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $3 AND state = 'processing'
            ",
        )
        .bind(&result.artifact_id)
        .bind(&result.title)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() == 1)
    }

    /// Records a failed attempt. Retryable failures under the attempt budget
    /// go back to `Queued` with an exponential backoff delay; everything
    /// else (non-retryable, or budget exhausted) becomes terminal `Failed`.
    /// Returns `true` if the job is now terminal.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self, message), err)]
    pub async fn fail(
        &self,
        job_id: Uuid,
        kind: ErrorKind,
        message: &str,
        backoff_base_secs: i64,
        backoff_factor: f64,
        backoff_max_secs: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row: (i32, i32) =
            sqlx::query_as("SELECT attempts_made, max_attempts FROM jobs WHERE id = $1 AND state = 'processing' FOR UPDATE")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(AppError::NotFound)?;
        let (attempts_made, max_attempts) = row;
        let next_attempts_made = attempts_made + 1;

        let is_terminal = matches!(kind, ErrorKind::Permanent) || next_attempts_made >= max_attempts;

        if is_terminal {
            sqlx::query(
                r"
                UPDATE jobs
                SET state = 'failed', attempts_made = $1,
                    error_kind = $2, error_message = $3,
                    finished_at = NOW(), updated_at = NOW()
                WHERE id = $4
                ",
            )
            .bind(next_attempts_made)
            .bind(kind.as_str())
            .bind(message)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        } else {
            let delay = backoff_delay_secs(next_attempts_made, backoff_base_secs, backoff_factor, backoff_max_secs);
            sqlx::query(
                r"
                UPDATE jobs
                SET state = 'queued', stage = 'queued', progress = 0,
                    attempts_made = $1,
                    next_attempt_at = NOW() + make_interval(secs => $2),
                    error_kind = $3, error_message = $4,
                    leased_at = NULL, lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE id = $5
                ",
            )
            .bind(next_attempts_made)
            .bind(delay as f64)
            .bind(kind.as_str())
            .bind(message)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(is_terminal)
    }

    /// Cancels a job if it is still `Queued`. A `Processing` job cannot be
    /// cancelled here — the caller is responsible for reporting that as a
    /// conflict rather than a no-op. Returns `true` if cancellation took
    /// effect.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let outcome = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'cancelled', finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND state = 'queued'
            ",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() == 1)
    }

    /// Fetches a single job by id.
    ///
    /// # Errors
    /// Returns a database error if the query fails, `AppError::NotFound` if
    /// no such job exists.
    #[tracing::instrument(skip(self), err)]
    pub async fn get(&self, job_id: Uuid) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(job_id).fetch_optional(&self.pool).await?;
        row.map(JobRow::into_job).ok_or(AppError::NotFound)
    }

    /// Lists an owner's non-terminal jobs, most recently submitted first.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn list_owner_pending(&self, owner_id: Uuid) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r"
            SELECT * FROM jobs
            WHERE owner_id = $1 AND state IN ('queued', 'processing')
            ORDER BY submitted_at DESC
            ",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    /// Per-kind queue-depth snapshot backing the `Stats` operation.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn kind_stats(&self) -> Result<Vec<KindStats>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r"
            SELECT kind,
                   COUNT(*) FILTER (WHERE state = 'queued') AS queued,
                   COUNT(*) FILTER (WHERE state = 'processing') AS processing
            FROM jobs
            GROUP BY kind
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, queued, processing)| {
                JobKind::from_str(&kind).map(|kind| KindStats { kind, queued, processing })
            })
            .collect())
    }

    /// Average wall-clock duration of the last `sample_size` jobs of `kind`
    /// that finished successfully, in seconds. Feeds the `estimated_wait`
    /// figure in `Stats`.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn avg_duration_secs(&self, kind: JobKind, sample_size: i64) -> Result<f64> {
        let row: (Option<f64>,) = sqlx::query_as(
            r"
            SELECT AVG(EXTRACT(EPOCH FROM (finished_at - leased_at)))
            FROM (
                SELECT finished_at, leased_at FROM jobs
                WHERE kind = $1 AND state = 'succeeded' AND leased_at IS NOT NULL
                ORDER BY finished_at DESC
                LIMIT $2
            ) recent
            ",
        )
        .bind(kind.as_str())
        .bind(sample_size)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.unwrap_or(0.0))
    }

    /// Returns stalled `Processing` jobs to `Queued`. Run by the lease-reaper
    /// background worker, independent of any single worker pool.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn reclaim_expired_leases(&self) -> Result<u64> {
        let outcome = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'queued', leased_at = NULL, lease_expires_at = NULL, updated_at = NOW()
            WHERE state = 'processing' AND lease_expires_at < NOW()
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected())
    }

    /// Deletes terminal jobs past their retention window. Run by the
    /// retention-sweeper background worker.
    ///
    /// # Errors
    /// Returns a database error if the delete fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn sweep_retention(&self, succeeded_retention_secs: i64, failed_retention_secs: i64) -> Result<u64> {
        let outcome = sqlx::query(
            r"
            DELETE FROM jobs
            WHERE (state = 'succeeded' AND finished_at < NOW() - make_interval(secs => $1))
               OR (state IN ('failed', 'cancelled') AND finished_at < NOW() - make_interval(secs => $2))
            ",
        )
        .bind(succeeded_retention_secs as f64)
        .bind(failed_retention_secs as f64)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected())
    }
}

/// `base * factor^(attempt - 1)`, capped at `max`.
fn backoff_delay_secs(attempt: i32, base: i64, factor: f64, max: i64) -> i64 {
    let exp = factor.powi(attempt.saturating_sub(1));
    #[allow(clippy::cast_possible_truncation)]
    let delay = (base as f64 * exp) as i64;
    delay.min(max).max(base)
}

#[cfg(test)]
mod tests {
    use super::backoff_delay_secs;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(backoff_delay_secs(1, 2, 2.0, 3600), 2);
        assert_eq!(backoff_delay_secs(2, 2, 2.0, 3600), 4);
        assert_eq!(backoff_delay_secs(3, 2, 2.0, 3600), 8);
        assert_eq!(backoff_delay_secs(20, 2, 2.0, 3600), 3600);
    }
}
