use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::adapters::database::DbPool;
use crate::domain::device_token::{DeviceToken, Platform};
use crate::error::Result;

#[derive(Debug, FromRow)]
struct DeviceTokenRow {
    token: String,
    owner_id: Uuid,
    platform: String,
    active: bool,
    registered_at: OffsetDateTime,
    last_seen_at: OffsetDateTime,
}

impl DeviceTokenRow {
    fn into_domain(self) -> Option<DeviceToken> {
        Some(DeviceToken {
            token: self.token,
            owner_id: self.owner_id,
            platform: Platform::from_str(&self.platform)?,
            active: self.active,
            registered_at: self.registered_at,
            last_seen_at: self.last_seen_at,
        })
    }
}

/// Push-registered device tokens, keyed by `token`. Re-registering a token
/// under a new owner transfers ownership rather than conflicting — the
/// common case of a device being re-logged-in to a different account.
#[derive(Clone, Debug)]
pub struct DeviceTokenRepository {
    pool: DbPool,
}

impl DeviceTokenRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed on `token`. Transfers ownership on conflict
    /// and reactivates the token if it had been deactivated.
    ///
    /// # Errors
    /// Returns a database error if the upsert fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn register(&self, owner_id: Uuid, token: &str, platform: Platform) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO device_tokens (token, owner_id, platform, active, registered_at, last_seen_at)
            VALUES ($1, $2, $3, TRUE, NOW(), NOW())
            ON CONFLICT (token) DO UPDATE
            SET owner_id = EXCLUDED.owner_id, platform = EXCLUDED.platform, active = TRUE, last_seen_at = NOW()
            ",
        )
        .bind(token)
        .bind(owner_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Looks up a token regardless of owner or active status, so the API
    /// layer can distinguish "doesn't exist" from "belongs to someone
    /// else" when deciding between `NotFound` and `Authorization`.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn get_by_token(&self, token: &str) -> Result<Option<DeviceToken>> {
        let row: Option<DeviceTokenRow> = sqlx::query_as("SELECT * FROM device_tokens WHERE token = $1").bind(token).fetch_optional(&self.pool).await?;
        Ok(row.and_then(DeviceTokenRow::into_domain))
    }

    /// Deactivates a single token, e.g. on explicit logout. A soft delete —
    /// the row survives so a later re-`register` can reactivate it.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn unregister(&self, token: &str) -> Result<()> {
        sqlx::query("UPDATE device_tokens SET active = FALSE WHERE token = $1").bind(token).execute(&self.pool).await?;
        Ok(())
    }

    /// Lists every active device for a user, used to fan out push sends.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(skip(self), err)]
    pub async fn list_active(&self, owner_id: Uuid) -> Result<Vec<DeviceToken>> {
        let rows: Vec<DeviceTokenRow> =
            sqlx::query_as("SELECT * FROM device_tokens WHERE owner_id = $1 AND active").bind(owner_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().filter_map(DeviceTokenRow::into_domain).collect())
    }

    /// Deactivates tokens the push provider reports as unregistered/invalid.
    /// Called opportunistically after a send, never blocking the send path.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[tracing::instrument(skip(self, tokens), err)]
    pub async fn invalidate_many(&self, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }
        let outcome =
            sqlx::query("UPDATE device_tokens SET active = FALSE WHERE token = ANY($1)").bind(tokens).execute(&self.pool).await?;
        Ok(outcome.rows_affected())
    }
}
