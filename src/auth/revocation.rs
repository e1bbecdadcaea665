use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;

/// Denylist of session tokens ended before their natural expiry.
#[async_trait]
pub trait RevocationStore: Send + Sync + 'static {
    /// Entries only need to outlive the token, so `expires_at` is the token's own `exp`.
    async fn revoke(&self, jti: Uuid, expires_at: OffsetDateTime) -> Result<(), StoreError>;

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError>;
}

pub struct PgRevocationStore {
    db: PgPool,
}

impl PgRevocationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn revoke(&self, jti: Uuid, expires_at: OffsetDateTime) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= now()")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (jti, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
        let hit: Option<(Uuid,)> =
            sqlx::query_as("SELECT jti FROM revoked_tokens WHERE jti = $1")
                .bind(jti)
                .fetch_optional(&self.db)
                .await?;
        Ok(hit.is_some())
    }
}
