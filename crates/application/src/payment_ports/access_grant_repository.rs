use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_core::AppResult;
use paygate_domain::{AccessGrant, ContentId, GrantId, SessionId, UserIdentifier};

/// Repository port for access grant persistence.
#[async_trait]
pub trait AccessGrantRepository: Send + Sync {
    /// Inserts a grant. Returns `AppError::Conflict` when the session already has one.
    async fn insert_grant(&self, grant: &AccessGrant) -> AppResult<()>;

    /// Finds the grant created for one session.
    async fn find_grant_for_session(&self, session_id: SessionId)
    -> AppResult<Option<AccessGrant>>;

    /// Finds the active grant with the latest expiry that is still valid at `now`.
    async fn find_latest_active_grant(
        &self,
        content_id: ContentId,
        user_identifier: &UserIdentifier,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AccessGrant>>;

    /// Increments the access counter and stamps the last access time.
    async fn record_access(&self, grant_id: GrantId, accessed_at: DateTime<Utc>) -> AppResult<()>;

    /// Clears the active flag of grants expired at `now`. Returns the number of rows touched.
    async fn deactivate_expired_grants(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
