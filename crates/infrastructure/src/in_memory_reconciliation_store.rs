use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_application::{
    ProcessedTransaction, ReviewItem, ReviewQueue, ReviewStatus, TransactionLedger, Watermark,
    WatermarkStore,
};
use paygate_core::AppResult;
use paygate_domain::{BankConnectionId, BankTransactionId, ReviewId};
use tokio::sync::RwLock;

/// In-memory ledger, review queue and watermark store.
#[derive(Default)]
pub struct InMemoryReconciliationStore {
    processed: RwLock<HashMap<BankTransactionId, ProcessedTransaction>>,
    reviews: RwLock<Vec<ReviewItem>>,
    watermarks: RwLock<HashMap<BankConnectionId, Watermark>>,
}

impl InMemoryReconciliationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLedger for InMemoryReconciliationStore {
    async fn find_processed(
        &self,
        transaction_id: &BankTransactionId,
    ) -> AppResult<Option<ProcessedTransaction>> {
        Ok(self.processed.read().await.get(transaction_id).cloned())
    }

    async fn record_processed(&self, record: &ProcessedTransaction) -> AppResult<bool> {
        let mut processed = self.processed.write().await;
        if processed.contains_key(&record.event.transaction_id) {
            return Ok(false);
        }

        processed.insert(record.event.transaction_id.clone(), record.clone());
        Ok(true)
    }
}

#[async_trait]
impl ReviewQueue for InMemoryReconciliationStore {
    async fn submit_review(&self, item: &ReviewItem) -> AppResult<bool> {
        let mut reviews = self.reviews.write().await;
        if reviews
            .iter()
            .any(|stored| stored.transaction.transaction_id == item.transaction.transaction_id)
        {
            return Ok(false);
        }

        reviews.push(item.clone());
        Ok(true)
    }

    async fn find_review(&self, review_id: ReviewId) -> AppResult<Option<ReviewItem>> {
        Ok(self
            .reviews
            .read()
            .await
            .iter()
            .find(|item| item.review_id == review_id)
            .cloned())
    }

    async fn list_open_reviews(&self, limit: usize) -> AppResult<Vec<ReviewItem>> {
        Ok(self
            .reviews
            .read()
            .await
            .iter()
            .filter(|item| item.status == ReviewStatus::Open)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn close_review(
        &self,
        review_id: ReviewId,
        status: ReviewStatus,
        closed_by: &str,
        closed_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut reviews = self.reviews.write().await;
        let Some(item) = reviews
            .iter_mut()
            .find(|item| item.review_id == review_id && item.status == ReviewStatus::Open)
        else {
            return Ok(false);
        };

        item.status = status;
        item.closed_by = Some(closed_by.to_owned());
        item.closed_at = Some(closed_at);
        Ok(true)
    }
}

#[async_trait]
impl WatermarkStore for InMemoryReconciliationStore {
    async fn load_watermark(
        &self,
        connection_id: &BankConnectionId,
    ) -> AppResult<Option<Watermark>> {
        Ok(self.watermarks.read().await.get(connection_id).cloned())
    }

    async fn store_watermark(
        &self,
        connection_id: &BankConnectionId,
        watermark: &Watermark,
    ) -> AppResult<()> {
        self.watermarks
            .write()
            .await
            .insert(connection_id.clone(), watermark.clone());
        Ok(())
    }
}
