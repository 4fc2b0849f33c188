//! PostgreSQL-backed read access to merchant content and payout accounts.

use async_trait::async_trait;
use sqlx::PgPool;

use paygate_application::ContentCatalog;
use paygate_core::{AppError, AppResult};
use paygate_domain::{ContentId, ContentOffer, CurrencyCode, MerchantId, Money, ReceivingAccount};

use crate::postgres_error::storage_error;

/// PostgreSQL implementation of the content catalog port.
#[derive(Clone)]
pub struct PostgresContentCatalog {
    pool: PgPool,
}

impl PostgresContentCatalog {
    /// Creates a catalog with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentCatalog for PostgresContentCatalog {
    async fn find_content(
        &self,
        merchant_id: MerchantId,
        content_id: ContentId,
    ) -> AppResult<Option<ContentOffer>> {
        sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT content_id, merchant_id, path, price_minor, currency,
                   access_duration_seconds, is_active
            FROM content
            WHERE merchant_id = $1
              AND content_id = $2
            "#,
        )
        .bind(merchant_id.as_uuid())
        .bind(content_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load content", error))?
        .map(ContentOffer::try_from)
        .transpose()
    }

    async fn find_content_by_path(
        &self,
        merchant_id: MerchantId,
        path: &str,
    ) -> AppResult<Option<ContentOffer>> {
        sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT content_id, merchant_id, path, price_minor, currency,
                   access_duration_seconds, is_active
            FROM content
            WHERE merchant_id = $1
              AND path = $2
            "#,
        )
        .bind(merchant_id.as_uuid())
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load content by path", error))?
        .map(ContentOffer::try_from)
        .transpose()
    }

    async fn find_receiving_account(
        &self,
        merchant_id: MerchantId,
    ) -> AppResult<Option<ReceivingAccount>> {
        let row = sqlx::query_as::<_, ReceivingAccountRow>(
            r#"
            SELECT name, bank_account_iban, bank_account_bic
            FROM merchants
            WHERE merchant_id = $1
              AND status = 'active'
            "#,
        )
        .bind(merchant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load merchant receiving account", error))?;

        row.map(|row| ReceivingAccount::new(row.bank_account_iban, row.bank_account_bic, row.name))
            .transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContentRow {
    content_id: uuid::Uuid,
    merchant_id: uuid::Uuid,
    path: String,
    price_minor: i64,
    currency: String,
    access_duration_seconds: i64,
    is_active: bool,
}

impl TryFrom<ContentRow> for ContentOffer {
    type Error = AppError;

    fn try_from(row: ContentRow) -> AppResult<Self> {
        Ok(Self {
            content_id: ContentId::from_uuid(row.content_id),
            merchant_id: MerchantId::from_uuid(row.merchant_id),
            path: row.path,
            price: Money::new(row.price_minor, CurrencyCode::new(row.currency)?)?,
            access_duration_seconds: row.access_duration_seconds,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReceivingAccountRow {
    name: String,
    bank_account_iban: String,
    bank_account_bic: Option<String>,
}
