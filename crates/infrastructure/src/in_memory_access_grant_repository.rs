use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_application::AccessGrantRepository;
use paygate_core::{AppError, AppResult};
use paygate_domain::{
    AccessGrant, AccessGrantParts, ContentId, GrantId, SessionId, UserIdentifier,
};
use tokio::sync::RwLock;

/// In-memory access grant store.
#[derive(Default)]
pub struct InMemoryAccessGrantRepository {
    grants: RwLock<HashMap<GrantId, AccessGrant>>,
}

impl InMemoryAccessGrantRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessGrantRepository for InMemoryAccessGrantRepository {
    async fn insert_grant(&self, grant: &AccessGrant) -> AppResult<()> {
        let mut grants = self.grants.write().await;
        if grants
            .values()
            .any(|stored| stored.session_id() == grant.session_id())
        {
            return Err(AppError::Conflict(format!(
                "session '{}' already has an access grant",
                grant.session_id()
            )));
        }

        grants.insert(grant.grant_id(), grant.clone());
        Ok(())
    }

    async fn find_grant_for_session(
        &self,
        session_id: SessionId,
    ) -> AppResult<Option<AccessGrant>> {
        Ok(self
            .grants
            .read()
            .await
            .values()
            .find(|grant| grant.session_id() == session_id)
            .cloned())
    }

    async fn find_latest_active_grant(
        &self,
        content_id: ContentId,
        user_identifier: &UserIdentifier,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AccessGrant>> {
        Ok(self
            .grants
            .read()
            .await
            .values()
            .filter(|grant| {
                grant.content_id() == content_id
                    && grant.user_identifier() == user_identifier
                    && grant.allows_access_at(now)
            })
            .max_by_key(|grant| grant.expires_at())
            .cloned())
    }

    async fn record_access(&self, grant_id: GrantId, accessed_at: DateTime<Utc>) -> AppResult<()> {
        let mut grants = self.grants.write().await;
        let grant = grants
            .get_mut(&grant_id)
            .ok_or_else(|| AppError::NotFound(format!("access grant '{grant_id}' not found")))?;
        *grant = grant.with_recorded_access(accessed_at);
        Ok(())
    }

    async fn deactivate_expired_grants(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut grants = self.grants.write().await;
        let mut deactivated = 0;
        for grant in grants.values_mut() {
            if !grant.is_active() || grant.expires_at() > now {
                continue;
            }

            *grant = AccessGrant::from_parts(AccessGrantParts {
                grant_id: grant.grant_id(),
                session_id: grant.session_id(),
                merchant_id: grant.merchant_id(),
                content_id: grant.content_id(),
                user_identifier: grant.user_identifier().clone(),
                granted_at: grant.granted_at(),
                expires_at: grant.expires_at(),
                access_count: grant.access_count(),
                last_accessed_at: grant.last_accessed_at(),
                is_active: false,
            })?;
            deactivated += 1;
        }

        Ok(deactivated)
    }
}
