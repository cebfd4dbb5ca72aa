use axum::{Json, extract::Path, extract::State, http::StatusCode, response::IntoResponse};

use crate::api::AppState;
use crate::api::dto::devices::RegisterDeviceRequest;
use crate::api::middleware::AuthUser;
use crate::error::{AppError, Result};

/// Registers (or transfers ownership of) a push endpoint for the caller.
///
/// # Errors
/// Returns `AppError::Validation` if the token is empty or oversized.
pub async fn register(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<RegisterDeviceRequest>,
) -> Result<impl IntoResponse> {
    body.validate().map_err(AppError::Validation)?;
    state.device_tokens.register(auth_user.owner_id, &body.token, body.platform).await?;
    Ok(StatusCode::CREATED)
}

/// Unregisters a push endpoint. Only the owner of the token may remove it.
///
/// # Errors
/// Returns `AppError::NotFound` if the token was never registered, or
/// `AppError::Authorization` if it exists but belongs to another owner.
pub async fn unregister(auth_user: AuthUser, State(state): State<AppState>, Path(token): Path<String>) -> Result<impl IntoResponse> {
    let existing = state.device_tokens.get_by_token(&token).await?.ok_or(AppError::NotFound)?;
    if existing.owner_id != auth_user.owner_id {
        return Err(AppError::Authorization);
    }
    state.device_tokens.unregister(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
