use async_trait::async_trait;
use paygate_core::AppResult;
use paygate_domain::{BankConnectionId, BankTransactionEvent};

use super::Watermark;

/// One page of transactions returned by a bank feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionBatch {
    /// Events in feed order.
    pub events: Vec<BankTransactionEvent>,
    /// Position after the last event, absent when the feed returned nothing new.
    pub next_watermark: Option<Watermark>,
}

/// External source of incoming bank transactions.
///
/// Implementations must return `AppError::Unavailable` for failures worth
/// retrying (timeouts, connection errors, upstream 5xx).
#[async_trait]
pub trait BankFeed: Send + Sync {
    /// Fetches up to `limit` transactions observed after `watermark`.
    async fn fetch_transactions_since(
        &self,
        connection_id: &BankConnectionId,
        watermark: Option<&Watermark>,
        limit: usize,
    ) -> AppResult<TransactionBatch>;
}
