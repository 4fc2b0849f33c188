use std::sync::Arc;
use std::time::Duration;

use paygate_core::{AppError, AppResult};
use paygate_domain::BankConnectionId;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::reconciliation_ports::{BankFeed, TransactionBatch, Watermark, WatermarkStore};
use crate::transaction_matcher::{MatchOutcome, TransactionMatcher};

mod config;

pub use config::ReconciliationConfig;

/// Counters of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Feed requests made, including retries.
    pub fetch_attempts: u32,
    /// Transactions returned by the feed.
    pub fetched: usize,
    /// Transactions that settled a session.
    pub settled: usize,
    /// Transactions already processed or paying a settled session.
    pub duplicates: usize,
    /// Transactions queued for manual review.
    pub flagged_for_review: usize,
    /// Whether the stored watermark moved.
    pub watermark_advanced: bool,
}

/// Polls a bank feed and feeds every transaction through the matcher.
#[derive(Clone)]
pub struct ReconciliationService {
    feed: Arc<dyn BankFeed>,
    watermarks: Arc<dyn WatermarkStore>,
    matcher: TransactionMatcher,
    config: ReconciliationConfig,
}

impl ReconciliationService {
    /// Creates a reconciliation service.
    #[must_use]
    pub fn new(
        feed: Arc<dyn BankFeed>,
        watermarks: Arc<dyn WatermarkStore>,
        matcher: TransactionMatcher,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            feed,
            watermarks,
            matcher,
            config,
        }
    }

    /// Runs one fetch-and-match cycle for a connection.
    ///
    /// The watermark only advances after every fetched event was processed,
    /// so a failed cycle is replayed in full and the ledger absorbs repeats.
    pub async fn run_cycle(&self, connection_id: &BankConnectionId) -> AppResult<CycleReport> {
        let watermark = self.watermarks.load_watermark(connection_id).await?;
        let mut report = CycleReport::default();

        let batch = self
            .fetch_with_retry(connection_id, watermark.as_ref(), &mut report)
            .await?;
        report.fetched = batch.events.len();

        for event in &batch.events {
            match self.matcher.process_event(event).await? {
                MatchOutcome::Settled { .. } => report.settled += 1,
                outcome @ MatchOutcome::DuplicateEvent { .. } => {
                    report.duplicates += 1;
                    if outcome.requires_review() {
                        report.flagged_for_review += 1;
                    }
                }
                _ => report.flagged_for_review += 1,
            }
        }

        if let Some(next) = batch.next_watermark
            && watermark.as_ref() != Some(&next)
        {
            self.watermarks.store_watermark(connection_id, &next).await?;
            report.watermark_advanced = true;
        }

        Ok(report)
    }

    /// Runs cycles every poll interval until `shutdown` flips to `true`.
    pub async fn run(&self, connection_id: BankConnectionId, mut shutdown: watch::Receiver<bool>) {
        info!(connection_id = %connection_id, "reconciliation loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle(&connection_id).await {
                Ok(report) if report.fetched > 0 => info!(
                    connection_id = %connection_id,
                    fetched = report.fetched,
                    settled = report.settled,
                    duplicates = report.duplicates,
                    flagged_for_review = report.flagged_for_review,
                    "reconciliation cycle completed"
                ),
                Ok(_) => {}
                Err(error) => warn!(
                    connection_id = %connection_id,
                    error = %error,
                    "reconciliation cycle failed"
                ),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(connection_id = %connection_id, "reconciliation loop stopped");
    }

    async fn fetch_with_retry(
        &self,
        connection_id: &BankConnectionId,
        watermark: Option<&Watermark>,
        report: &mut CycleReport,
    ) -> AppResult<TransactionBatch> {
        let max_attempts = self.config.max_fetch_attempts.max(1);
        let mut attempt = 1;

        loop {
            report.fetch_attempts = attempt;
            let result = match tokio::time::timeout(
                self.config.fetch_timeout,
                self.feed
                    .fetch_transactions_since(connection_id, watermark, self.config.batch_limit),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::Unavailable(format!(
                    "bank feed request timed out after {} ms",
                    self.config.fetch_timeout.as_millis()
                ))),
            };

            match result {
                Ok(batch) => return Ok(batch),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        connection_id = %connection_id,
                        attempt,
                        delay_ms = whole_millis(delay),
                        error = %error,
                        "bank feed fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
