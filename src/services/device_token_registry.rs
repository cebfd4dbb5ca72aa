use uuid::Uuid;

use crate::adapters::database::device_token_repo::DeviceTokenRepository;
use crate::domain::device_token::{DeviceToken, Platform};
use crate::error::Result;

/// Facade over the Device Token Registry's storage. Thin on purpose — the
/// interesting behavior (idempotent upsert with ownership transfer) lives in
/// the repository, which owns the SQL.
#[derive(Clone, Debug)]
pub struct DeviceTokenRegistry {
    repo: DeviceTokenRepository,
}

impl DeviceTokenRegistry {
    #[must_use]
    pub const fn new(repo: DeviceTokenRepository) -> Self {
        Self { repo }
    }

    /// # Errors
    /// Propagates database errors.
    #[tracing::instrument(skip(self), err)]
    pub async fn register(&self, owner_id: Uuid, token: &str, platform: Platform) -> Result<()> {
        self.repo.register(owner_id, token, platform).await
    }

    /// # Errors
    /// Propagates database errors.
    #[tracing::instrument(skip(self), err)]
    pub async fn unregister(&self, token: &str) -> Result<()> {
        self.repo.unregister(token).await
    }

    /// # Errors
    /// Propagates database errors.
    #[tracing::instrument(skip(self), err)]
    pub async fn get_by_token(&self, token: &str) -> Result<Option<DeviceToken>> {
        self.repo.get_by_token(token).await
    }

    /// # Errors
    /// Propagates database errors.
    #[tracing::instrument(skip(self), err)]
    pub async fn list_active(&self, owner_id: Uuid) -> Result<Vec<DeviceToken>> {
        self.repo.list_active(owner_id).await
    }

    /// # Errors
    /// Propagates database errors.
    #[tracing::instrument(skip(self, tokens), err)]
    pub async fn invalidate_many(&self, tokens: &[String]) -> Result<u64> {
        self.repo.invalidate_many(tokens).await
    }
}
