use axum::{Json, extract::Path, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::dto::generation::{CancelResponse, SubmitJobRequest, SubmitJobResponse};
use crate::api::middleware::AuthUser;
use crate::domain::job::{Job, JobPriority, JobResult};
use crate::error::Result;
use crate::services::job_service::KindQueueStats;

/// Enqueues a new generation job for the authenticated user.
///
/// # Errors
/// Returns `AppError::Validation` if the payload fails validation.
pub async fn submit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse> {
    let priority = body.priority.unwrap_or(JobPriority::Normal);
    let (job_id, estimated_wait_seconds) = state.job_service.submit(auth_user.owner_id, body.payload, priority).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id, estimated_wait_seconds })))
}

/// Returns the current state, stage, and progress of one job.
///
/// # Errors
/// Returns `AppError::NotFound` if the job doesn't exist or isn't owned by
/// the caller.
pub async fn status(auth_user: AuthUser, State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Json<Job>> {
    let job = state.job_service.status(auth_user.owner_id, job_id).await?;
    Ok(Json(job))
}

/// Returns the artifact reference for a succeeded job.
///
/// # Errors
/// Returns `AppError::Conflict` if not yet terminal, `AppError::Gone` if the
/// result has passed its retention window, `AppError::NotFound` otherwise.
pub async fn result(auth_user: AuthUser, State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Json<JobResult>> {
    let result = state.job_service.result(auth_user.owner_id, job_id).await?;
    Ok(Json(result))
}

/// Cancels a `Queued` job.
///
/// # Errors
/// Returns `AppError::Conflict` if the job is already processing or
/// already finished.
pub async fn cancel(auth_user: AuthUser, State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<impl IntoResponse> {
    state.job_service.cancel(auth_user.owner_id, job_id).await?;
    Ok(Json(CancelResponse { cancelled: true }))
}

/// Lists the caller's non-terminal jobs.
///
/// # Errors
/// Propagates database errors.
pub async fn pending(auth_user: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<Job>>> {
    let jobs = state.job_service.list_pending(auth_user.owner_id).await?;
    Ok(Json(jobs))
}

/// Admin/monitoring queue-depth and wait-estimate snapshot.
///
/// # Errors
/// Propagates database errors.
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<Vec<KindQueueStats>>> {
    let stats = state.job_service.stats().await?;
    Ok(Json(stats))
}
