use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::AppError;

/// Bearer-token claims. Identity itself (login, password, refresh tokens)
/// is out of scope for this subsystem — an upstream auth service issues
/// these tokens; this server only verifies them and trusts `sub` as the
/// owner id for every job/device/event operation.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    exp: usize,
}

/// Extracted from a valid `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub owner_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = parts.headers.get(header::AUTHORIZATION).ok_or(AppError::Authorization)?;
        let header_str = header_value.to_str().map_err(|_| AppError::Authorization)?;
        let token = header_str.strip_prefix("Bearer ").ok_or(AppError::Authorization)?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Authorization)?;

        Ok(Self { owner_id: data.claims.sub })
    }
}
