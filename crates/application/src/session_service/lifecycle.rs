use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult};
use paygate_domain::{PaymentSession, PaymentStatus, SessionId};
use serde::Serialize;
use tracing::{info, warn};

use super::{SessionService, SessionStatusView};
use crate::payment_ports::SessionSwap;

/// Counters of one expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    /// Pending sessions past their expiry that were examined.
    pub examined: usize,
    /// Sessions moved to `expired`.
    pub expired: usize,
    /// Sessions that left `pending` concurrently and were left alone.
    pub skipped: usize,
    /// Sessions whose write failed; retried on the next pass.
    pub failed: usize,
}

impl SessionService {
    /// Loads a session or fails with `AppError::NotFound`.
    pub async fn get_session(&self, session_id: SessionId) -> AppResult<PaymentSession> {
        self.repository
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment session '{session_id}' not found")))
    }

    /// Returns the public status view of a session.
    pub async fn get_session_status(&self, session_id: SessionId) -> AppResult<SessionStatusView> {
        let session = self.get_session(session_id).await?;
        Ok(SessionStatusView::from(&session))
    }

    /// Cancels a pending session on behalf of the payer or merchant.
    pub async fn cancel_session(&self, session_id: SessionId) -> AppResult<PaymentSession> {
        let session = self.get_session(session_id).await?;
        let cancelled = session.cancel()?;
        self.swap_from_pending(cancelled).await
    }

    /// Marks a pending session failed with an operator supplied reason.
    pub async fn fail_session(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> AppResult<PaymentSession> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation(
                "failure reason must not be empty".to_owned(),
            ));
        }

        let session = self.get_session(session_id).await?;
        let failed = session.fail(reason)?;
        self.swap_from_pending(failed).await
    }

    /// Expires pending sessions whose payment window closed at or before `now`.
    ///
    /// A session settled between listing and writing keeps its settled state.
    pub async fn expire_stale_sessions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<ExpiryReport> {
        let candidates = self.repository.list_expirable_sessions(now, limit).await?;
        let mut report = ExpiryReport {
            examined: candidates.len(),
            ..ExpiryReport::default()
        };

        for session in candidates {
            let expired = match session.expire(now) {
                Ok(expired) => expired,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };

            let swap = self
                .with_store_retry("expire session", || {
                    self.repository
                        .compare_and_swap_status(PaymentStatus::Pending, &expired)
                })
                .await;

            match swap {
                Ok(SessionSwap::Applied) => report.expired += 1,
                Ok(SessionSwap::Rejected { current }) => {
                    info!(
                        session_id = %current.session_id(),
                        status = %current.status(),
                        "session left pending before expiry"
                    );
                    report.skipped += 1;
                }
                Err(error) => {
                    warn!(session_id = %session.session_id(), error = %error, "failed to expire session");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Finishes sessions stuck in `paid` without a recorded access grant.
    ///
    /// Returns the number of sessions moved to `access_granted`.
    pub async fn complete_paid_sessions(&self, limit: usize) -> AppResult<usize> {
        let paid_sessions = self
            .repository
            .list_sessions_with_status(PaymentStatus::Paid, limit)
            .await?;

        let mut completed = 0;
        for session in paid_sessions {
            let session_id = session.session_id();
            match self.complete_access_grant(session).await {
                Ok(_) => {
                    info!(session_id = %session_id, "recovered access grant for paid session");
                    completed += 1;
                }
                Err(error) => {
                    warn!(session_id = %session_id, error = %error, "failed to complete access grant");
                }
            }
        }

        Ok(completed)
    }

    async fn swap_from_pending(&self, next: PaymentSession) -> AppResult<PaymentSession> {
        let swap = self
            .with_store_retry("close session", || {
                self.repository
                    .compare_and_swap_status(PaymentStatus::Pending, &next)
            })
            .await?;

        match swap {
            SessionSwap::Applied => {
                info!(
                    session_id = %next.session_id(),
                    status = %next.status(),
                    "payment session closed"
                );
                Ok(next)
            }
            SessionSwap::Rejected { current } => Err(AppError::Conflict(format!(
                "invalid transition for session '{}': {} -> {}",
                current.session_id(),
                current.status(),
                next.status()
            ))),
        }
    }
}
