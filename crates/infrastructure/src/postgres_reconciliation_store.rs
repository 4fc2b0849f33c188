//! PostgreSQL-backed transaction ledger, review queue and feed watermarks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use paygate_application::{
    MatchClassification, ProcessedTransaction, ReviewItem, ReviewQueue, ReviewStatus,
    TransactionLedger, Watermark, WatermarkStore,
};
use paygate_core::{AppError, AppResult};
use paygate_domain::{
    BankConnectionId, BankTransactionEvent, BankTransactionId, CurrencyCode, ReviewId, SessionId,
};

use crate::postgres_error::storage_error;

/// PostgreSQL implementation of the reconciliation ports.
#[derive(Clone)]
pub struct PostgresReconciliationStore {
    pool: PgPool,
}

impl PostgresReconciliationStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionLedger for PostgresReconciliationStore {
    async fn find_processed(
        &self,
        transaction_id: &BankTransactionId,
    ) -> AppResult<Option<ProcessedTransaction>> {
        sqlx::query_as::<_, ProcessedRow>(
            r#"
            SELECT transaction_id, connection_id, amount_minor, currency, remittance_text,
                   observed_at, classification, session_id, processed_at
            FROM bank_transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load processed bank transaction", error))?
        .map(ProcessedTransaction::try_from)
        .transpose()
    }

    async fn record_processed(&self, record: &ProcessedTransaction) -> AppResult<bool> {
        let event = &record.event;
        let result = sqlx::query(
            r#"
            INSERT INTO bank_transactions (
                transaction_id,
                connection_id,
                amount_minor,
                currency,
                remittance_text,
                observed_at,
                classification,
                session_id,
                processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(event.transaction_id.as_str())
        .bind(event.connection_id.as_str())
        .bind(event.amount_minor)
        .bind(event.currency.as_str())
        .bind(event.remittance_text.as_str())
        .bind(event.observed_at)
        .bind(record.classification.as_str())
        .bind(record.session_id.map(|session_id| session_id.as_uuid()))
        .bind(record.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("record processed bank transaction", error))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ReviewQueue for PostgresReconciliationStore {
    async fn submit_review(&self, item: &ReviewItem) -> AppResult<bool> {
        let event = &item.transaction;
        let result = sqlx::query(
            r#"
            INSERT INTO reconciliation_reviews (
                review_id,
                transaction_id,
                connection_id,
                amount_minor,
                currency,
                remittance_text,
                observed_at,
                classification,
                session_id,
                detail,
                status,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(item.review_id.as_uuid())
        .bind(event.transaction_id.as_str())
        .bind(event.connection_id.as_str())
        .bind(event.amount_minor)
        .bind(event.currency.as_str())
        .bind(event.remittance_text.as_str())
        .bind(event.observed_at)
        .bind(item.classification.as_str())
        .bind(item.session_id.map(|session_id| session_id.as_uuid()))
        .bind(item.detail.as_str())
        .bind(item.status.as_str())
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("submit reconciliation review", error))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_review(&self, review_id: ReviewId) -> AppResult<Option<ReviewItem>> {
        sqlx::query_as::<_, ReviewRow>(
            r#"
            SELECT review_id, transaction_id, connection_id, amount_minor, currency,
                   remittance_text, observed_at, classification, session_id, detail,
                   status, created_at, closed_at, closed_by
            FROM reconciliation_reviews
            WHERE review_id = $1
            "#,
        )
        .bind(review_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load reconciliation review", error))?
        .map(ReviewItem::try_from)
        .transpose()
    }

    async fn list_open_reviews(&self, limit: usize) -> AppResult<Vec<ReviewItem>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            r#"
            SELECT review_id, transaction_id, connection_id, amount_minor, currency,
                   remittance_text, observed_at, classification, session_id, detail,
                   status, created_at, closed_at, closed_by
            FROM reconciliation_reviews
            WHERE status = 'open'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list open reconciliation reviews", error))?;

        rows.into_iter().map(ReviewItem::try_from).collect()
    }

    async fn close_review(
        &self,
        review_id: ReviewId,
        status: ReviewStatus,
        closed_by: &str,
        closed_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reconciliation_reviews
            SET status = $2,
                closed_by = $3,
                closed_at = $4
            WHERE review_id = $1
              AND status = 'open'
            "#,
        )
        .bind(review_id.as_uuid())
        .bind(status.as_str())
        .bind(closed_by)
        .bind(closed_at)
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("close reconciliation review", error))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl WatermarkStore for PostgresReconciliationStore {
    async fn load_watermark(
        &self,
        connection_id: &BankConnectionId,
    ) -> AppResult<Option<Watermark>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT watermark
            FROM reconciliation_watermarks
            WHERE connection_id = $1
            "#,
        )
        .bind(connection_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load reconciliation watermark", error))?
        .map(Watermark::new)
        .transpose()
    }

    async fn store_watermark(
        &self,
        connection_id: &BankConnectionId,
        watermark: &Watermark,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_watermarks (connection_id, watermark, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (connection_id)
            DO UPDATE SET watermark = EXCLUDED.watermark, updated_at = now()
            "#,
        )
        .bind(connection_id.as_str())
        .bind(watermark.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("store reconciliation watermark", error))?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessedRow {
    transaction_id: String,
    connection_id: String,
    amount_minor: i64,
    currency: String,
    remittance_text: String,
    observed_at: DateTime<Utc>,
    classification: String,
    session_id: Option<uuid::Uuid>,
    processed_at: DateTime<Utc>,
}

impl TryFrom<ProcessedRow> for ProcessedTransaction {
    type Error = AppError;

    fn try_from(row: ProcessedRow) -> AppResult<Self> {
        Ok(Self {
            event: BankTransactionEvent {
                transaction_id: BankTransactionId::new(row.transaction_id)?,
                connection_id: BankConnectionId::new(row.connection_id)?,
                amount_minor: row.amount_minor,
                currency: CurrencyCode::new(row.currency)?,
                remittance_text: row.remittance_text,
                observed_at: row.observed_at,
            },
            classification: MatchClassification::parse(row.classification.as_str())?,
            session_id: row.session_id.map(SessionId::from_uuid),
            processed_at: row.processed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    review_id: uuid::Uuid,
    transaction_id: String,
    connection_id: String,
    amount_minor: i64,
    currency: String,
    remittance_text: String,
    observed_at: DateTime<Utc>,
    classification: String,
    session_id: Option<uuid::Uuid>,
    detail: String,
    status: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    closed_by: Option<String>,
}

impl TryFrom<ReviewRow> for ReviewItem {
    type Error = AppError;

    fn try_from(row: ReviewRow) -> AppResult<Self> {
        Ok(Self {
            review_id: ReviewId::from_uuid(row.review_id),
            transaction: BankTransactionEvent {
                transaction_id: BankTransactionId::new(row.transaction_id)?,
                connection_id: BankConnectionId::new(row.connection_id)?,
                amount_minor: row.amount_minor,
                currency: CurrencyCode::new(row.currency)?,
                remittance_text: row.remittance_text,
                observed_at: row.observed_at,
            },
            classification: MatchClassification::parse(row.classification.as_str())?,
            session_id: row.session_id.map(SessionId::from_uuid),
            detail: row.detail,
            status: ReviewStatus::parse(row.status.as_str())?,
            created_at: row.created_at,
            closed_at: row.closed_at,
            closed_by: row.closed_by,
        })
    }
}
