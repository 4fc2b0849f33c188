use paygate_core::{AppError, AppResult};
use paygate_domain::{
    BankTransactionEvent, BankTransactionId, PaymentSession, PaymentStatus, SessionId,
};
use tracing::info;

use super::SessionService;
use crate::payment_ports::SessionSwap;

/// Result of applying a bank transaction to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// This call moved the session out of `pending`.
    Settled(PaymentSession),
    /// The session had already been settled before this call.
    AlreadySettled {
        /// Current session state.
        session: PaymentSession,
        /// Whether the settling transaction is the one passed in.
        same_transaction: bool,
    },
}

impl SettlementOutcome {
    /// Returns the session state after settlement.
    #[must_use]
    pub fn session(&self) -> &PaymentSession {
        match self {
            Self::Settled(session) | Self::AlreadySettled { session, .. } => session,
        }
    }
}

impl SessionService {
    /// Settles a pending session with a bank transaction and grants access.
    ///
    /// Only the first settlement wins. A session that already left `pending`
    /// through expiry, cancellation or failure yields `AppError::Conflict`.
    pub async fn settle_session(
        &self,
        session_id: SessionId,
        event: &BankTransactionEvent,
    ) -> AppResult<SettlementOutcome> {
        let session = self.get_session(session_id).await?;
        if session.status().is_settled() {
            return self
                .resume_settled(session, &event.transaction_id)
                .await;
        }

        let paid = session.settle(self.clock.now(), event.transaction_id.clone())?;
        let swap = self
            .with_store_retry("settle session", || {
                self.repository
                    .compare_and_swap_status(PaymentStatus::Pending, &paid)
            })
            .await?;

        match swap {
            SessionSwap::Applied => {
                info!(
                    session_id = %session_id,
                    transaction_id = %event.transaction_id,
                    "payment session settled"
                );
                let granted = self.complete_access_grant(paid).await?;
                Ok(SettlementOutcome::Settled(granted))
            }
            SessionSwap::Rejected { current } if current.status().is_settled() => {
                self.resume_settled(current, &event.transaction_id).await
            }
            SessionSwap::Rejected { current } => Err(AppError::Conflict(format!(
                "session '{session_id}' is {} and can no longer be settled",
                current.status()
            ))),
        }
    }

    async fn resume_settled(
        &self,
        session: PaymentSession,
        transaction_id: &BankTransactionId,
    ) -> AppResult<SettlementOutcome> {
        let same_transaction = session.settled_by_transaction_id() == Some(transaction_id);
        let session = if session.status() == PaymentStatus::Paid {
            self.complete_access_grant(session).await?
        } else {
            session
        };

        Ok(SettlementOutcome::AlreadySettled {
            session,
            same_transaction,
        })
    }

    /// Creates the grant of a paid session and moves it to `access_granted`.
    ///
    /// Safe to call repeatedly: an existing grant is reused.
    pub(super) async fn complete_access_grant(
        &self,
        paid: PaymentSession,
    ) -> AppResult<PaymentSession> {
        let granted_at = paid.paid_at().unwrap_or_else(|| self.clock.now());
        let grant = self
            .with_store_retry("grant access", || {
                self.access_service.ensure_grant(&paid, granted_at)
            })
            .await?;

        let granted = paid.record_access_grant(grant.granted_at(), grant.expires_at())?;
        let swap = self
            .with_store_retry("record access grant", || {
                self.repository
                    .compare_and_swap_status(PaymentStatus::Paid, &granted)
            })
            .await?;

        match swap {
            SessionSwap::Applied => Ok(granted),
            SessionSwap::Rejected { current }
                if current.status() == PaymentStatus::AccessGranted =>
            {
                Ok(current)
            }
            SessionSwap::Rejected { current } => Err(AppError::Conflict(format!(
                "session '{}' is {} while recording its access grant",
                current.session_id(),
                current.status()
            ))),
        }
    }
}
