use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult};
use paygate_domain::{BankTransactionEvent, ReviewId, SessionId};
use serde::{Deserialize, Serialize};

use super::MatchClassification;

/// Lifecycle of a manual review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Waiting for an operator.
    Open,
    /// Operator settled a session from the item.
    Resolved,
    /// Operator closed the item without settlement.
    Dismissed,
}

impl ReviewStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "open" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(AppError::Validation(format!(
                "unknown review status '{value}'"
            ))),
        }
    }
}

/// Bank transaction held for manual reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem {
    /// Review identifier.
    pub review_id: ReviewId,
    /// Transaction that needs attention.
    pub transaction: BankTransactionEvent,
    /// Why the transaction could not be settled automatically.
    pub classification: MatchClassification,
    /// Candidate session, when one was identified.
    pub session_id: Option<SessionId>,
    /// Human readable detail for the operator.
    pub detail: String,
    /// Current status.
    pub status: ReviewStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Closing timestamp.
    pub closed_at: Option<DateTime<Utc>>,
    /// Operator who closed the item.
    pub closed_by: Option<String>,
}

/// Queue of transactions awaiting manual reconciliation.
#[async_trait]
pub trait ReviewQueue: Send + Sync {
    /// Submits an item. Returns `false` when the transaction is already queued.
    async fn submit_review(&self, item: &ReviewItem) -> AppResult<bool>;

    /// Finds one review item.
    async fn find_review(&self, review_id: ReviewId) -> AppResult<Option<ReviewItem>>;

    /// Lists open items, oldest first.
    async fn list_open_reviews(&self, limit: usize) -> AppResult<Vec<ReviewItem>>;

    /// Closes an item that is still open. Returns `false` when it was already closed.
    async fn close_review(
        &self,
        review_id: ReviewId,
        status: ReviewStatus,
        closed_by: &str,
        closed_at: DateTime<Utc>,
    ) -> AppResult<bool>;
}
