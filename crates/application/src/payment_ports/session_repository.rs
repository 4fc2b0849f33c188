use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_core::AppResult;
use paygate_domain::{PaymentReference, PaymentSession, PaymentStatus, SessionId};

/// Outcome of one conditional status write.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSwap {
    /// Stored status matched the expected status and the new state was written.
    Applied,
    /// Stored status differed; nothing was written.
    Rejected {
        /// Session state observed instead.
        current: PaymentSession,
    },
}

/// Repository port for payment session persistence.
#[async_trait]
pub trait PaymentSessionRepository: Send + Sync {
    /// Inserts a new session.
    ///
    /// Returns `AppError::Conflict` when the session id or the reference is already taken.
    async fn insert_session(&self, session: &PaymentSession) -> AppResult<()>;

    /// Finds a session by identifier.
    async fn find_session(&self, session_id: SessionId) -> AppResult<Option<PaymentSession>>;

    /// Finds a session by its unique payment reference, whatever its status.
    async fn find_session_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> AppResult<Option<PaymentSession>>;

    /// Returns whether any session already uses the reference.
    async fn reference_exists(&self, reference: &PaymentReference) -> AppResult<bool>;

    /// Writes `next` only when the stored status still equals `expected`.
    ///
    /// Returns `AppError::NotFound` when the session does not exist and
    /// `AppError::Conflict` when the settling bank transaction already settled
    /// another session.
    async fn compare_and_swap_status(
        &self,
        expected: PaymentStatus,
        next: &PaymentSession,
    ) -> AppResult<SessionSwap>;

    /// Lists pending sessions whose expiry time is at or before `now`, oldest first.
    async fn list_expirable_sessions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>>;

    /// Lists sessions currently in `status`, oldest first.
    async fn list_sessions_with_status(
        &self,
        status: PaymentStatus,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>>;
}
