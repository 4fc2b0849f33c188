//! PostgreSQL-backed access grant repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use paygate_application::AccessGrantRepository;
use paygate_core::{AppError, AppResult};
use paygate_domain::{
    AccessGrant, AccessGrantParts, ContentId, GrantId, MerchantId, SessionId, UserIdentifier,
};

use crate::postgres_error::{is_unique_violation, storage_error};

/// PostgreSQL implementation of the access grant repository port.
#[derive(Clone)]
pub struct PostgresAccessGrantRepository {
    pool: PgPool,
}

impl PostgresAccessGrantRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessGrantRepository for PostgresAccessGrantRepository {
    async fn insert_grant(&self, grant: &AccessGrant) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO access_grants (
                grant_id,
                session_id,
                merchant_id,
                content_id,
                user_identifier,
                granted_at,
                expires_at,
                access_count,
                last_accessed_at,
                is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(grant.grant_id().as_uuid())
        .bind(grant.session_id().as_uuid())
        .bind(grant.merchant_id().as_uuid())
        .bind(grant.content_id().as_uuid())
        .bind(grant.user_identifier().as_str())
        .bind(grant.granted_at())
        .bind(grant.expires_at())
        .bind(grant.access_count())
        .bind(grant.last_accessed_at())
        .bind(grant.is_active())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(format!(
                "session '{}' already has an access grant",
                grant.session_id()
            ))),
            Err(error) => Err(storage_error("insert access grant", error)),
        }
    }

    async fn find_grant_for_session(
        &self,
        session_id: SessionId,
    ) -> AppResult<Option<AccessGrant>> {
        sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT grant_id, session_id, merchant_id, content_id, user_identifier,
                   granted_at, expires_at, access_count, last_accessed_at, is_active
            FROM access_grants
            WHERE session_id = $1
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load access grant", error))?
        .map(AccessGrant::try_from)
        .transpose()
    }

    async fn find_latest_active_grant(
        &self,
        content_id: ContentId,
        user_identifier: &UserIdentifier,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AccessGrant>> {
        sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT grant_id, session_id, merchant_id, content_id, user_identifier,
                   granted_at, expires_at, access_count, last_accessed_at, is_active
            FROM access_grants
            WHERE content_id = $1
              AND user_identifier = $2
              AND is_active
              AND expires_at > $3
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(content_id.as_uuid())
        .bind(user_identifier.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("look up access grant", error))?
        .map(AccessGrant::try_from)
        .transpose()
    }

    async fn record_access(&self, grant_id: GrantId, accessed_at: DateTime<Utc>) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE access_grants
            SET access_count = access_count + 1,
                last_accessed_at = $2
            WHERE grant_id = $1
            "#,
        )
        .bind(grant_id.as_uuid())
        .bind(accessed_at)
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("record content access", error))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "access grant '{grant_id}' not found"
            )));
        }

        Ok(())
    }

    async fn deactivate_expired_grants(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE access_grants
            SET is_active = FALSE
            WHERE is_active
              AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("deactivate expired access grants", error))?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    grant_id: uuid::Uuid,
    session_id: uuid::Uuid,
    merchant_id: uuid::Uuid,
    content_id: uuid::Uuid,
    user_identifier: String,
    granted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access_count: i64,
    last_accessed_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<GrantRow> for AccessGrant {
    type Error = AppError;

    fn try_from(row: GrantRow) -> AppResult<Self> {
        AccessGrant::from_parts(AccessGrantParts {
            grant_id: GrantId::from_uuid(row.grant_id),
            session_id: SessionId::from_uuid(row.session_id),
            merchant_id: MerchantId::from_uuid(row.merchant_id),
            content_id: ContentId::from_uuid(row.content_id),
            user_identifier: UserIdentifier::new(row.user_identifier)?,
            granted_at: row.granted_at,
            expires_at: row.expires_at,
            access_count: row.access_count,
            last_accessed_at: row.last_accessed_at,
            is_active: row.is_active,
        })
    }
}
