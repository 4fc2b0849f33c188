use std::sync::Arc;

use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult};
use paygate_domain::{
    AccessGrant, ContentId, GrantId, PaymentSession, PaymentStatus, UserIdentifier,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::payment_ports::AccessGrantRepository;

/// Result of an access check for one user and content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    /// Whether a valid grant exists.
    pub has_access: bool,
    /// Expiry of the grant that allowed access.
    pub expires_at: Option<DateTime<Utc>>,
    /// Grant that allowed access.
    pub grant_id: Option<GrantId>,
}

impl AccessDecision {
    fn denied() -> Self {
        Self {
            has_access: false,
            expires_at: None,
            grant_id: None,
        }
    }
}

/// Issues and checks time-boxed content access grants.
#[derive(Clone)]
pub struct AccessService {
    repository: Arc<dyn AccessGrantRepository>,
}

impl AccessService {
    /// Creates an access service.
    #[must_use]
    pub fn new(repository: Arc<dyn AccessGrantRepository>) -> Self {
        Self { repository }
    }

    /// Creates the grant for a settled session.
    ///
    /// The grant window starts at `granted_at` and lasts for the access duration
    /// snapshotted on the session. Fails with `AppError::Conflict` when the
    /// session already has a grant.
    pub async fn grant_access(
        &self,
        session: &PaymentSession,
        granted_at: DateTime<Utc>,
    ) -> AppResult<AccessGrant> {
        let grant = build_grant(session, granted_at)?;
        self.repository.insert_grant(&grant).await?;

        info!(
            session_id = %session.session_id(),
            grant_id = %grant.grant_id(),
            expires_at = %grant.expires_at(),
            "access granted"
        );
        Ok(grant)
    }

    /// Returns the existing grant of a session or creates it.
    ///
    /// Used by settlement paths that may resume after a partial failure.
    pub(crate) async fn ensure_grant(
        &self,
        session: &PaymentSession,
        granted_at: DateTime<Utc>,
    ) -> AppResult<AccessGrant> {
        if let Some(existing) = self
            .repository
            .find_grant_for_session(session.session_id())
            .await?
        {
            return Ok(existing);
        }

        match self.grant_access(session, granted_at).await {
            Ok(grant) => Ok(grant),
            Err(AppError::Conflict(message)) => self
                .repository
                .find_grant_for_session(session.session_id())
                .await?
                .ok_or(AppError::Conflict(message)),
            Err(error) => Err(error),
        }
    }

    /// Checks whether `user_identifier` may view `content_id` at `now`.
    ///
    /// A successful check increments the grant's access counter. Counter
    /// failures are logged and do not change the decision.
    pub async fn check_access(
        &self,
        content_id: ContentId,
        user_identifier: &UserIdentifier,
        now: DateTime<Utc>,
    ) -> AppResult<AccessDecision> {
        let Some(grant) = self
            .repository
            .find_latest_active_grant(content_id, user_identifier, now)
            .await?
        else {
            return Ok(AccessDecision::denied());
        };

        if !grant.allows_access_at(now) {
            return Ok(AccessDecision::denied());
        }

        if let Err(error) = self.repository.record_access(grant.grant_id(), now).await {
            warn!(grant_id = %grant.grant_id(), error = %error, "failed to record content access");
        }

        Ok(AccessDecision {
            has_access: true,
            expires_at: Some(grant.expires_at()),
            grant_id: Some(grant.grant_id()),
        })
    }

    /// Finds the grant issued for one session.
    pub async fn find_grant_for_session(
        &self,
        session: &PaymentSession,
    ) -> AppResult<Option<AccessGrant>> {
        self.repository
            .find_grant_for_session(session.session_id())
            .await
    }

    /// Marks grants expired at `now` inactive. Returns the number deactivated.
    pub async fn deactivate_expired_grants(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.repository.deactivate_expired_grants(now).await
    }
}

fn build_grant(session: &PaymentSession, granted_at: DateTime<Utc>) -> AppResult<AccessGrant> {
    if session.status() != PaymentStatus::Paid {
        return Err(AppError::Conflict(format!(
            "session '{}' must be paid before access is granted, found {}",
            session.session_id(),
            session.status()
        )));
    }

    let user_identifier = session
        .user_identifier()
        .cloned()
        .unwrap_or_else(|| UserIdentifier::for_anonymous_session(session.session_id()));

    AccessGrant::new(
        session.session_id(),
        session.merchant_id(),
        session.content_id(),
        user_identifier,
        granted_at,
        granted_at + session.access_duration(),
    )
}
