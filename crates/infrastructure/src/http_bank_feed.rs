use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_application::{BankFeed, TransactionBatch, Watermark};
use paygate_core::{AppError, AppResult};
use paygate_domain::{BankConnectionId, BankTransactionEvent, BankTransactionId, CurrencyCode};
use serde::Deserialize;
use tracing::warn;

/// HTTP adapter for a bank aggregation service exposing incoming transactions.
///
/// Expects `GET {base}/connections/{id}/transactions?since=&limit=` to answer
/// with `{ "transactions": [...], "next_watermark": "..." }`.
pub struct HttpBankFeed {
    http_client: reqwest::Client,
    base_url: reqwest::Url,
    api_token: Option<String>,
}

impl HttpBankFeed {
    /// Creates a feed client for the given service base URL.
    pub fn new(
        http_client: reqwest::Client,
        base_url: &str,
        api_token: Option<String>,
    ) -> AppResult<Self> {
        let base_url = reqwest::Url::parse(base_url).map_err(|error| {
            AppError::Validation(format!("invalid bank feed base URL '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Validation(format!(
                "bank feed base URL '{base_url}' cannot carry a path"
            )));
        }

        Ok(Self {
            http_client,
            base_url,
            api_token: api_token.filter(|token| !token.trim().is_empty()),
        })
    }

    fn transactions_url(
        &self,
        connection_id: &BankConnectionId,
        watermark: Option<&Watermark>,
        limit: usize,
    ) -> AppResult<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AppError::Internal("bank feed base URL cannot carry a path".to_owned())
            })?
            .pop_if_empty()
            .extend(["connections", connection_id.as_str(), "transactions"]);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", limit.to_string().as_str());
            if let Some(watermark) = watermark {
                query.append_pair("since", watermark.as_str());
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl BankFeed for HttpBankFeed {
    async fn fetch_transactions_since(
        &self,
        connection_id: &BankConnectionId,
        watermark: Option<&Watermark>,
        limit: usize,
    ) -> AppResult<TransactionBatch> {
        let url = self.transactions_url(connection_id, watermark, limit)?;
        let mut request = self.http_client.get(url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() || error.is_connect() || error.is_request() {
                AppError::Unavailable(format!("bank feed transport error: {error}"))
            } else {
                AppError::Internal(format!("bank feed request failed: {error}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::Unavailable(format!(
                "bank feed answered with transient status {status}"
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::Internal(format!(
                "bank feed rejected request with status {status}: {body}"
            )));
        }

        let body = response.text().await.map_err(|error| {
            AppError::Unavailable(format!("failed to read bank feed response: {error}"))
        })?;
        decode_page(connection_id, body.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    transactions: Vec<FeedTransaction>,
    next_watermark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedTransaction {
    transaction_id: String,
    amount_minor: i64,
    currency: String,
    #[serde(default)]
    remittance_text: String,
    booked_at: DateTime<Utc>,
}

fn decode_page(connection_id: &BankConnectionId, body: &str) -> AppResult<TransactionBatch> {
    let page: FeedPage = serde_json::from_str(body)
        .map_err(|error| AppError::Internal(format!("malformed bank feed response: {error}")))?;

    let mut events = Vec::with_capacity(page.transactions.len());
    for transaction in page.transactions {
        match decode_transaction(connection_id, transaction) {
            Ok(event) => events.push(event),
            Err(error) => warn!(
                connection_id = %connection_id,
                error = %error,
                "skipping malformed bank transaction"
            ),
        }
    }

    let next_watermark = page
        .next_watermark
        .filter(|value| !value.trim().is_empty())
        .map(Watermark::new)
        .transpose()?;

    Ok(TransactionBatch {
        events,
        next_watermark,
    })
}

fn decode_transaction(
    connection_id: &BankConnectionId,
    transaction: FeedTransaction,
) -> AppResult<BankTransactionEvent> {
    Ok(BankTransactionEvent {
        transaction_id: BankTransactionId::new(transaction.transaction_id)?,
        connection_id: connection_id.clone(),
        amount_minor: transaction.amount_minor,
        currency: CurrencyCode::new(transaction.currency)?,
        remittance_text: transaction.remittance_text,
        observed_at: transaction.booked_at,
    })
}
