use std::sync::Arc;

use paygate_core::{AppError, AppResult};
use paygate_domain::{PaymentSession, ReviewId, SessionId};
use tracing::info;

use crate::clock::Clock;
use crate::reconciliation_ports::{ReviewItem, ReviewQueue, ReviewStatus};
use crate::session_service::{SessionService, SettlementOutcome};

/// Operator workflow over transactions that could not be settled automatically.
#[derive(Clone)]
pub struct ReviewService {
    review_queue: Arc<dyn ReviewQueue>,
    session_service: SessionService,
    clock: Arc<dyn Clock>,
}

impl ReviewService {
    /// Creates a review service.
    #[must_use]
    pub fn new(
        review_queue: Arc<dyn ReviewQueue>,
        session_service: SessionService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            review_queue,
            session_service,
            clock,
        }
    }

    /// Lists open review items, oldest first.
    pub async fn list_open_reviews(&self, limit: usize) -> AppResult<Vec<ReviewItem>> {
        self.review_queue.list_open_reviews(limit).await
    }

    /// Settles `session_id` with the transaction held in a review item.
    ///
    /// The operator vouches for the match, so amount and reference checks are
    /// skipped. The session must still be pending or already settled by the
    /// same transaction.
    pub async fn settle_from_review(
        &self,
        review_id: ReviewId,
        session_id: SessionId,
        reviewer: &str,
    ) -> AppResult<PaymentSession> {
        let reviewer = normalize_reviewer(reviewer)?;
        let item = self.open_review(review_id).await?;

        let session = match self
            .session_service
            .settle_session(session_id, &item.transaction)
            .await?
        {
            SettlementOutcome::Settled(session)
            | SettlementOutcome::AlreadySettled {
                session,
                same_transaction: true,
            } => session,
            SettlementOutcome::AlreadySettled {
                same_transaction: false,
                ..
            } => {
                return Err(AppError::Conflict(format!(
                    "session '{session_id}' was already paid by another transaction"
                )));
            }
        };

        self.close(review_id, ReviewStatus::Resolved, reviewer).await?;
        info!(
            review_id = %review_id,
            session_id = %session_id,
            reviewer,
            "review resolved by manual settlement"
        );
        Ok(session)
    }

    /// Closes a review item without settling anything.
    pub async fn dismiss_review(&self, review_id: ReviewId, reviewer: &str) -> AppResult<()> {
        let reviewer = normalize_reviewer(reviewer)?;
        self.open_review(review_id).await?;
        self.close(review_id, ReviewStatus::Dismissed, reviewer)
            .await?;

        info!(review_id = %review_id, reviewer, "review dismissed");
        Ok(())
    }

    async fn open_review(&self, review_id: ReviewId) -> AppResult<ReviewItem> {
        let item = self
            .review_queue
            .find_review(review_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("review '{review_id}' not found")))?;

        if item.status != ReviewStatus::Open {
            return Err(AppError::Conflict(format!(
                "review '{review_id}' is already {}",
                item.status.as_str()
            )));
        }

        Ok(item)
    }

    async fn close(&self, review_id: ReviewId, status: ReviewStatus, reviewer: &str) -> AppResult<()> {
        let closed = self
            .review_queue
            .close_review(review_id, status, reviewer, self.clock.now())
            .await?;
        if !closed {
            return Err(AppError::Conflict(format!(
                "review '{review_id}' was closed concurrently"
            )));
        }

        Ok(())
    }
}

fn normalize_reviewer(reviewer: &str) -> AppResult<&str> {
    let reviewer = reviewer.trim();
    if reviewer.is_empty() {
        return Err(AppError::Validation(
            "reviewer must not be empty".to_owned(),
        ));
    }

    Ok(reviewer)
}

#[cfg(test)]
mod tests;
