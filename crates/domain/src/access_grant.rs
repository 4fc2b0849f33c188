use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::{ContentId, GrantId, MerchantId, SessionId, UserIdentifier};

/// Time-limited permission for one user to retrieve one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    grant_id: GrantId,
    session_id: SessionId,
    merchant_id: MerchantId,
    content_id: ContentId,
    user_identifier: UserIdentifier,
    granted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access_count: i64,
    last_accessed_at: Option<DateTime<Utc>>,
    is_active: bool,
}

/// Persisted state of a grant, used to restore it from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrantParts {
    /// Grant identifier.
    pub grant_id: GrantId,
    /// Originating session.
    pub session_id: SessionId,
    /// Merchant owning the content.
    pub merchant_id: MerchantId,
    /// Content item.
    pub content_id: ContentId,
    /// Grantee.
    pub user_identifier: UserIdentifier,
    /// Grant timestamp.
    pub granted_at: DateTime<Utc>,
    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
    /// Number of successful access checks.
    pub access_count: i64,
    /// Timestamp of the latest successful access check.
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Whether the grant has not been deactivated by cleanup.
    pub is_active: bool,
}

impl AccessGrant {
    /// Creates a fresh active grant.
    pub fn new(
        session_id: SessionId,
        merchant_id: MerchantId,
        content_id: ContentId,
        user_identifier: UserIdentifier,
        granted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Self::from_parts(AccessGrantParts {
            grant_id: GrantId::new(),
            session_id,
            merchant_id,
            content_id,
            user_identifier,
            granted_at,
            expires_at,
            access_count: 0,
            last_accessed_at: None,
            is_active: true,
        })
    }

    /// Restores a grant from persisted state.
    pub fn from_parts(parts: AccessGrantParts) -> AppResult<Self> {
        if parts.expires_at <= parts.granted_at {
            return Err(AppError::Validation(format!(
                "access grant for session '{}' must expire after it is granted",
                parts.session_id
            )));
        }

        if parts.access_count < 0 {
            return Err(AppError::Validation(
                "access count must not be negative".to_owned(),
            ));
        }

        Ok(Self {
            grant_id: parts.grant_id,
            session_id: parts.session_id,
            merchant_id: parts.merchant_id,
            content_id: parts.content_id,
            user_identifier: parts.user_identifier,
            granted_at: parts.granted_at,
            expires_at: parts.expires_at,
            access_count: parts.access_count,
            last_accessed_at: parts.last_accessed_at,
            is_active: parts.is_active,
        })
    }

    /// Returns whether the grant allows access at `now`.
    ///
    /// Access holds strictly before the expiry instant and not at it.
    #[must_use]
    pub fn allows_access_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }

    /// Returns the grant with one more recorded access.
    #[must_use]
    pub fn with_recorded_access(&self, accessed_at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.access_count = next.access_count.saturating_add(1);
        next.last_accessed_at = Some(accessed_at);
        next
    }

    /// Returns the grant identifier.
    #[must_use]
    pub fn grant_id(&self) -> GrantId {
        self.grant_id
    }

    /// Returns the originating session.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the merchant owning the content.
    #[must_use]
    pub fn merchant_id(&self) -> MerchantId {
        self.merchant_id
    }

    /// Returns the content item.
    #[must_use]
    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    /// Returns the grantee.
    #[must_use]
    pub fn user_identifier(&self) -> &UserIdentifier {
        &self.user_identifier
    }

    /// Returns the grant timestamp.
    #[must_use]
    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    /// Returns the expiry timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the number of recorded accesses.
    #[must_use]
    pub fn access_count(&self) -> i64 {
        self.access_count
    }

    /// Returns the latest recorded access.
    #[must_use]
    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.last_accessed_at
    }

    /// Returns whether cleanup has not deactivated the grant.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }
}
