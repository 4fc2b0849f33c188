use paygate_core::{AppError, AppResult};
use paygate_domain::{
    ContentOffer, CurrencyCode, MerchantId, Money, NewPaymentSession, PaymentSession, SessionId,
    UserIdentifier,
};
use tracing::{debug, info};

use super::{CreateSessionInput, SessionService};
use crate::reference_generator::reference_exhausted;

impl SessionService {
    /// Creates a pending session for a content item at its listed price.
    ///
    /// The requested amount and currency must equal the content price.
    pub async fn create_session(&self, input: CreateSessionInput) -> AppResult<PaymentSession> {
        let currency = CurrencyCode::new(&input.currency)?;
        let amount = Money::new(input.amount_minor, currency)?;
        self.ensure_amount_within_bounds(&amount)?;
        let user_identifier = parse_user_identifier(input.user_identifier)?;

        let content = self
            .content_catalog
            .find_content(input.merchant_id, input.content_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "content '{}' does not exist for merchant '{}'",
                    input.content_id, input.merchant_id
                ))
            })?;
        ensure_sellable(&content)?;

        if !content
            .price
            .matches_exactly(amount.amount_minor(), amount.currency())
        {
            return Err(AppError::Validation(format!(
                "amount {amount} does not match price {} of content '{}'",
                content.price, content.content_id
            )));
        }

        self.open_session(&content, user_identifier).await
    }

    /// Creates a pending session for the content published at `path`.
    pub async fn create_session_for_path(
        &self,
        merchant_id: MerchantId,
        path: &str,
        user_identifier: Option<String>,
    ) -> AppResult<PaymentSession> {
        let path = path.trim();
        if path.is_empty() {
            return Err(AppError::Validation(
                "content path must not be empty".to_owned(),
            ));
        }
        let user_identifier = parse_user_identifier(user_identifier)?;

        let content = self
            .content_catalog
            .find_content_by_path(merchant_id, path)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "content path '{path}' does not exist for merchant '{merchant_id}'"
                ))
            })?;
        ensure_sellable(&content)?;
        self.ensure_amount_within_bounds(&content.price)?;

        self.open_session(&content, user_identifier).await
    }

    async fn open_session(
        &self,
        content: &ContentOffer,
        user_identifier: Option<UserIdentifier>,
    ) -> AppResult<PaymentSession> {
        let receiving_account = self
            .content_catalog
            .find_receiving_account(content.merchant_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "merchant '{}' has no receiving account configured",
                    content.merchant_id
                ))
            })?;

        // Lookup collisions and insert collisions share one attempt budget.
        let max_attempts = self.reference_generator.max_attempts();
        for attempt in 1..=max_attempts {
            let now = self.clock.now();
            let Some(reference) = self.reference_generator.draw(now, attempt).await? else {
                continue;
            };
            let payload =
                self.payload_builder
                    .build_payload(&content.price, &reference, &receiving_account)?;

            let session = PaymentSession::new(NewPaymentSession {
                session_id: SessionId::new(),
                merchant_id: content.merchant_id,
                content_id: content.content_id,
                user_identifier: user_identifier.clone(),
                amount: content.price.clone(),
                reference,
                payload,
                access_duration_seconds: content.access_duration_seconds,
                created_at: now,
                expires_at: now + self.config.session_timeout,
            })?;

            match self.repository.insert_session(&session).await {
                Ok(()) => {
                    info!(
                        session_id = %session.session_id(),
                        content_id = %session.content_id(),
                        reference = %session.reference(),
                        amount = %session.amount(),
                        "payment session created"
                    );
                    return Ok(session);
                }
                Err(AppError::Conflict(message)) => {
                    debug!(attempt, message, "session insert collided, drawing a new reference");
                }
                Err(error) => return Err(error),
            }
        }

        Err(reference_exhausted(max_attempts))
    }

    fn ensure_amount_within_bounds(&self, amount: &Money) -> AppResult<()> {
        let amount_minor = amount.amount_minor();
        if amount_minor < self.config.min_amount_minor
            || amount_minor > self.config.max_amount_minor
        {
            return Err(AppError::Validation(format!(
                "amount {amount} is outside the accepted range {}..={} minor units",
                self.config.min_amount_minor, self.config.max_amount_minor
            )));
        }

        Ok(())
    }
}

fn parse_user_identifier(value: Option<String>) -> AppResult<Option<UserIdentifier>> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(UserIdentifier::new)
        .transpose()
}

fn ensure_sellable(content: &ContentOffer) -> AppResult<()> {
    if content.is_active {
        return Ok(());
    }

    Err(AppError::Validation(format!(
        "content '{}' is not active",
        content.content_id
    )))
}
