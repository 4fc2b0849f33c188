use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult};
use paygate_domain::{BankTransactionEvent, BankTransactionId, SessionId};
use serde::{Deserialize, Serialize};

/// Classification recorded for each processed bank transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchClassification {
    /// Settled a pending session.
    Settled,
    /// Already processed, or the session was already settled.
    DuplicateEvent,
    /// No reference found in the remittance text.
    Unmatched,
    /// More than one distinct reference found.
    Ambiguous,
    /// Reference unknown or the session is closed.
    NoMatchingSession,
    /// Amount or currency differs from the session.
    AmountMismatch,
}

impl MatchClassification {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settled => "settled",
            Self::DuplicateEvent => "duplicate_event",
            Self::Unmatched => "unmatched",
            Self::Ambiguous => "ambiguous",
            Self::NoMatchingSession => "no_matching_session",
            Self::AmountMismatch => "amount_mismatch",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "settled" => Ok(Self::Settled),
            "duplicate_event" => Ok(Self::DuplicateEvent),
            "unmatched" => Ok(Self::Unmatched),
            "ambiguous" => Ok(Self::Ambiguous),
            "no_matching_session" => Ok(Self::NoMatchingSession),
            "amount_mismatch" => Ok(Self::AmountMismatch),
            _ => Err(AppError::Validation(format!(
                "unknown match classification '{value}'"
            ))),
        }
    }
}

/// Ledger entry for one processed bank transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTransaction {
    /// Event as received from the feed.
    pub event: BankTransactionEvent,
    /// Outcome of matching.
    pub classification: MatchClassification,
    /// Session the event was matched to, when any.
    pub session_id: Option<SessionId>,
    /// Processing timestamp.
    pub processed_at: DateTime<Utc>,
}

/// Idempotency ledger keyed by bank transaction id.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Finds the entry recorded for a transaction id.
    async fn find_processed(
        &self,
        transaction_id: &BankTransactionId,
    ) -> AppResult<Option<ProcessedTransaction>>;

    /// Records a processed transaction. Returns `false` when an entry already existed.
    async fn record_processed(&self, record: &ProcessedTransaction) -> AppResult<bool>;
}
