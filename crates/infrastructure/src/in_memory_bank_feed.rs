use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use paygate_application::{BankFeed, TransactionBatch, Watermark};
use paygate_core::{AppError, AppResult};
use paygate_domain::{BankConnectionId, BankTransactionEvent};
use tokio::sync::RwLock;

/// Scripted bank feed for local runs and tests.
///
/// Watermarks are the number of events already handed out for a connection.
#[derive(Default)]
pub struct InMemoryBankFeed {
    events: RwLock<HashMap<BankConnectionId, Vec<BankTransactionEvent>>>,
    pending_failures: RwLock<VecDeque<AppError>>,
}

impl InMemoryBankFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the connection it names.
    pub async fn publish(&self, event: BankTransactionEvent) {
        self.events
            .write()
            .await
            .entry(event.connection_id.clone())
            .or_default()
            .push(event);
    }

    /// Makes the next fetch fail with `error`. Failures queue up in order.
    pub async fn fail_next_fetch(&self, error: AppError) {
        self.pending_failures.write().await.push_back(error);
    }
}

#[async_trait]
impl BankFeed for InMemoryBankFeed {
    async fn fetch_transactions_since(
        &self,
        connection_id: &BankConnectionId,
        watermark: Option<&Watermark>,
        limit: usize,
    ) -> AppResult<TransactionBatch> {
        if let Some(error) = self.pending_failures.write().await.pop_front() {
            return Err(error);
        }

        let offset = match watermark {
            Some(watermark) => watermark.as_str().parse::<usize>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid in-memory feed watermark '{}': {error}",
                    watermark.as_str()
                ))
            })?,
            None => 0,
        };

        let events = self.events.read().await;
        let page: Vec<BankTransactionEvent> = events
            .get(connection_id)
            .map(|events| events.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default();
        if page.is_empty() {
            return Ok(TransactionBatch::default());
        }

        let next_watermark = Watermark::new((offset + page.len()).to_string())?;
        Ok(TransactionBatch {
            events: page,
            next_watermark: Some(next_watermark),
        })
    }
}
