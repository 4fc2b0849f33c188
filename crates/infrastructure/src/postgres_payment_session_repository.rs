//! PostgreSQL-backed payment session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use paygate_application::{PaymentSessionRepository, SessionSwap};
use paygate_core::{AppError, AppResult};
use paygate_domain::{
    BankTransactionId, ContentId, CurrencyCode, MerchantId, Money, NewPaymentSession,
    PaymentPayload, PaymentReference, PaymentSession, PaymentSessionParts, PaymentStatus,
    SessionId, UserIdentifier,
};

use crate::postgres_error::{is_unique_violation, storage_error};

const SESSION_COLUMNS: &str = r#"
    session_id,
    merchant_id,
    content_id,
    user_identifier,
    amount_minor,
    currency,
    payment_reference,
    payment_payload,
    access_duration_seconds,
    status,
    created_at,
    expires_at,
    paid_at,
    access_granted_at,
    access_expires_at,
    settled_by_transaction_id,
    failure_reason
"#;

/// PostgreSQL implementation of the payment session repository port.
#[derive(Clone)]
pub struct PostgresPaymentSessionRepository {
    pool: PgPool,
}

impl PostgresPaymentSessionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(
        &self,
        predicate: &str,
        value: SessionLookup<'_>,
    ) -> AppResult<Option<PaymentSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM payment_sessions WHERE {predicate}");
        let query = sqlx::query_as::<_, SessionRow>(sql.as_str());
        let query = match value {
            SessionLookup::Id(session_id) => query.bind(session_id.as_uuid()),
            SessionLookup::Reference(reference) => query.bind(reference.as_str()),
        };

        query
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| storage_error("load payment session", error))?
            .map(PaymentSession::try_from)
            .transpose()
    }
}

enum SessionLookup<'a> {
    Id(SessionId),
    Reference(&'a PaymentReference),
}

#[async_trait]
impl PaymentSessionRepository for PostgresPaymentSessionRepository {
    async fn insert_session(&self, session: &PaymentSession) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_sessions (
                session_id,
                merchant_id,
                content_id,
                user_identifier,
                amount_minor,
                currency,
                payment_reference,
                payment_payload,
                access_duration_seconds,
                status,
                created_at,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(session.session_id().as_uuid())
        .bind(session.merchant_id().as_uuid())
        .bind(session.content_id().as_uuid())
        .bind(session.user_identifier().map(UserIdentifier::as_str))
        .bind(session.amount().amount_minor())
        .bind(session.amount().currency().as_str())
        .bind(session.reference().as_str())
        .bind(session.payload().as_str())
        .bind(session.access_duration_seconds())
        .bind(session.status().as_str())
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(format!(
                "payment session '{}' or reference '{}' already exists",
                session.session_id(),
                session.reference()
            ))),
            Err(error) => Err(storage_error("insert payment session", error)),
        }
    }

    async fn find_session(&self, session_id: SessionId) -> AppResult<Option<PaymentSession>> {
        self.fetch_one_by("session_id = $1", SessionLookup::Id(session_id))
            .await
    }

    async fn find_session_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> AppResult<Option<PaymentSession>> {
        self.fetch_one_by("payment_reference = $1", SessionLookup::Reference(reference))
            .await
    }

    async fn reference_exists(&self, reference: &PaymentReference) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM payment_sessions WHERE payment_reference = $1
            )
            "#,
        )
        .bind(reference.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| storage_error("check payment reference", error))
    }

    async fn compare_and_swap_status(
        &self,
        expected: PaymentStatus,
        next: &PaymentSession,
    ) -> AppResult<SessionSwap> {
        let result = sqlx::query(
            r#"
            UPDATE payment_sessions
            SET status = $3,
                paid_at = $4,
                access_granted_at = $5,
                access_expires_at = $6,
                settled_by_transaction_id = $7,
                failure_reason = $8,
                updated_at = now()
            WHERE session_id = $1
              AND status = $2
            "#,
        )
        .bind(next.session_id().as_uuid())
        .bind(expected.as_str())
        .bind(next.status().as_str())
        .bind(next.paid_at())
        .bind(next.access_granted_at())
        .bind(next.access_expires_at())
        .bind(next.settled_by_transaction_id().map(BankTransactionId::as_str))
        .bind(next.failure_reason())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                return AppError::Conflict(format!(
                    "bank transaction '{}' already settled another payment session",
                    next.settled_by_transaction_id().map_or("", BankTransactionId::as_str)
                ));
            }
            storage_error("update payment session status", error)
        })?;

        if result.rows_affected() == 1 {
            return Ok(SessionSwap::Applied);
        }

        let current = self.find_session(next.session_id()).await?.ok_or_else(|| {
            AppError::NotFound(format!("payment session '{}' not found", next.session_id()))
        })?;
        Ok(SessionSwap::Rejected { current })
    }

    async fn list_expirable_sessions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM payment_sessions \
             WHERE status = $1 AND expires_at <= $2 \
             ORDER BY expires_at ASC LIMIT $3"
        );
        let rows = sqlx::query_as::<_, SessionRow>(sql.as_str())
            .bind(PaymentStatus::Pending.as_str())
            .bind(now)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| storage_error("list expirable payment sessions", error))?;

        rows.into_iter().map(PaymentSession::try_from).collect()
    }

    async fn list_sessions_with_status(
        &self,
        status: PaymentStatus,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM payment_sessions \
             WHERE status = $1 \
             ORDER BY created_at ASC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, SessionRow>(sql.as_str())
            .bind(status.as_str())
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| storage_error("list payment sessions by status", error))?;

        rows.into_iter().map(PaymentSession::try_from).collect()
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: uuid::Uuid,
    merchant_id: uuid::Uuid,
    content_id: uuid::Uuid,
    user_identifier: Option<String>,
    amount_minor: i64,
    currency: String,
    payment_reference: String,
    payment_payload: String,
    access_duration_seconds: i64,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    access_granted_at: Option<DateTime<Utc>>,
    access_expires_at: Option<DateTime<Utc>>,
    settled_by_transaction_id: Option<String>,
    failure_reason: Option<String>,
}

impl TryFrom<SessionRow> for PaymentSession {
    type Error = AppError;

    fn try_from(row: SessionRow) -> AppResult<Self> {
        PaymentSession::from_parts(PaymentSessionParts {
            session: NewPaymentSession {
                session_id: SessionId::from_uuid(row.session_id),
                merchant_id: MerchantId::from_uuid(row.merchant_id),
                content_id: ContentId::from_uuid(row.content_id),
                user_identifier: row.user_identifier.map(UserIdentifier::new).transpose()?,
                amount: Money::new(row.amount_minor, CurrencyCode::new(row.currency)?)?,
                reference: PaymentReference::parse(row.payment_reference.as_str())?,
                payload: PaymentPayload::new(row.payment_payload),
                access_duration_seconds: row.access_duration_seconds,
                created_at: row.created_at,
                expires_at: row.expires_at,
            },
            status: PaymentStatus::parse(row.status.as_str())?,
            paid_at: row.paid_at,
            access_granted_at: row.access_granted_at,
            access_expires_at: row.access_expires_at,
            settled_by_transaction_id: row
                .settled_by_transaction_id
                .map(BankTransactionId::new)
                .transpose()?,
            failure_reason: row.failure_reason,
        })
    }
}
