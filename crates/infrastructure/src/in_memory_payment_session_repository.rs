use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_application::{PaymentSessionRepository, SessionSwap};
use paygate_core::{AppError, AppResult};
use paygate_domain::{PaymentReference, PaymentSession, PaymentStatus, SessionId};
use tokio::sync::RwLock;

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<SessionId, PaymentSession>,
    references: HashMap<PaymentReference, SessionId>,
}

/// In-memory session store for tests and single-process deployments.
///
/// Status swaps run under one write lock, which makes them atomic per session.
#[derive(Default)]
pub struct InMemoryPaymentSessionRepository {
    table: RwLock<SessionTable>,
}

impl InMemoryPaymentSessionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentSessionRepository for InMemoryPaymentSessionRepository {
    async fn insert_session(&self, session: &PaymentSession) -> AppResult<()> {
        let mut table = self.table.write().await;
        if table.sessions.contains_key(&session.session_id()) {
            return Err(AppError::Conflict(format!(
                "payment session '{}' already exists",
                session.session_id()
            )));
        }
        if table.references.contains_key(session.reference()) {
            return Err(AppError::Conflict(format!(
                "payment reference '{}' is already in use",
                session.reference()
            )));
        }

        table
            .references
            .insert(session.reference().clone(), session.session_id());
        table.sessions.insert(session.session_id(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: SessionId) -> AppResult<Option<PaymentSession>> {
        Ok(self.table.read().await.sessions.get(&session_id).cloned())
    }

    async fn find_session_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> AppResult<Option<PaymentSession>> {
        let table = self.table.read().await;
        Ok(table
            .references
            .get(reference)
            .and_then(|session_id| table.sessions.get(session_id))
            .cloned())
    }

    async fn reference_exists(&self, reference: &PaymentReference) -> AppResult<bool> {
        Ok(self.table.read().await.references.contains_key(reference))
    }

    async fn compare_and_swap_status(
        &self,
        expected: PaymentStatus,
        next: &PaymentSession,
    ) -> AppResult<SessionSwap> {
        let mut table = self.table.write().await;
        if let Some(transaction_id) = next.settled_by_transaction_id()
            && table.sessions.values().any(|stored| {
                stored.session_id() != next.session_id()
                    && stored.settled_by_transaction_id() == Some(transaction_id)
            })
        {
            return Err(AppError::Conflict(format!(
                "bank transaction '{transaction_id}' already settled another payment session"
            )));
        }

        let Some(current) = table.sessions.get_mut(&next.session_id()) else {
            return Err(AppError::NotFound(format!(
                "payment session '{}' not found",
                next.session_id()
            )));
        };

        if current.status() != expected {
            return Ok(SessionSwap::Rejected {
                current: current.clone(),
            });
        }

        *current = next.clone();
        Ok(SessionSwap::Applied)
    }

    async fn list_expirable_sessions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>> {
        let table = self.table.read().await;
        let mut sessions: Vec<PaymentSession> = table
            .sessions
            .values()
            .filter(|session| {
                session.status() == PaymentStatus::Pending && session.is_past_expiry(now)
            })
            .cloned()
            .collect();
        sessions.sort_by_key(PaymentSession::expires_at);
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn list_sessions_with_status(
        &self,
        status: PaymentStatus,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>> {
        let table = self.table.read().await;
        let mut sessions: Vec<PaymentSession> = table
            .sessions
            .values()
            .filter(|session| session.status() == status)
            .cloned()
            .collect();
        sessions.sort_by_key(PaymentSession::created_at);
        sessions.truncate(limit);
        Ok(sessions)
    }
}
