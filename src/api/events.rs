use axum::extract::{Path, State};
use axum::response::sse::{KeepAlive, Sse};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::error::Result;

/// SSE stream of every job event for the caller.
pub async fn stream_owner_events(auth_user: AuthUser, State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let stream = state.sse_hub.stream_for_owner(auth_user.owner_id);
    Sse::new(stream).keep_alive(KeepAlive::new())
}

/// SSE stream filtered to one job, scoped to its owner.
///
/// # Errors
/// Returns `AppError::NotFound` if the job doesn't exist, or
/// `AppError::Authorization` if it exists but isn't owned by the caller.
pub async fn stream_job_events(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse> {
    // Confirms the job exists and is owned by the caller before opening the
    // stream; the stream itself only ever delivers events already scoped to
    // the caller's own per-owner channel.
    state.job_service.status(auth_user.owner_id, job_id).await?;
    let stream = state.sse_hub.stream_for_job(auth_user.owner_id, job_id);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}
