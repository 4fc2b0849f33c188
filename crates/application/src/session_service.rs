use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use paygate_core::AppResult;
use paygate_domain::{ContentId, MerchantId, PaymentSession, SessionId};
use serde::Serialize;
use tracing::warn;

use crate::access_service::AccessService;
use crate::clock::Clock;
use crate::payment_ports::{ContentCatalog, PaymentPayloadBuilder, PaymentSessionRepository};
use crate::reference_generator::ReferenceGenerator;

mod config;
mod creation;
mod lifecycle;
mod settlement;

pub use config::SessionConfig;
pub use lifecycle::ExpiryReport;
pub use settlement::SettlementOutcome;

/// Input for creating a payment session for one content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionInput {
    /// Owning merchant.
    pub merchant_id: MerchantId,
    /// Content being purchased.
    pub content_id: ContentId,
    /// Optional caller supplied user identifier.
    pub user_identifier: Option<String>,
    /// Amount in minor units; must equal the content price.
    pub amount_minor: i64,
    /// ISO 4217 currency code; must equal the content price currency.
    pub currency: String,
}

/// Public view of a session as exposed to payers polling for status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatusView {
    /// Session identifier.
    pub session_id: SessionId,
    /// Public status label; access grants are reported as `paid`.
    pub status: &'static str,
    /// Amount due in minor units.
    pub amount_minor: i64,
    /// Currency code.
    pub currency: String,
    /// Payment reference to put in the remittance.
    pub reference: String,
    /// Session expiry.
    pub expires_at: DateTime<Utc>,
    /// Settlement time, once paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// End of the access window, once granted.
    pub access_expires_at: Option<DateTime<Utc>>,
}

impl From<&PaymentSession> for SessionStatusView {
    fn from(session: &PaymentSession) -> Self {
        Self {
            session_id: session.session_id(),
            status: session.status().public_label(),
            amount_minor: session.amount().amount_minor(),
            currency: session.amount().currency().as_str().to_owned(),
            reference: session.reference().as_str().to_owned(),
            expires_at: session.expires_at(),
            paid_at: session.paid_at(),
            access_expires_at: session.access_expires_at(),
        }
    }
}

/// Owns the payment session lifecycle from creation to access grant.
#[derive(Clone)]
pub struct SessionService {
    repository: Arc<dyn PaymentSessionRepository>,
    content_catalog: Arc<dyn ContentCatalog>,
    payload_builder: Arc<dyn PaymentPayloadBuilder>,
    access_service: AccessService,
    reference_generator: ReferenceGenerator,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionService {
    /// Creates a session service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn PaymentSessionRepository>,
        content_catalog: Arc<dyn ContentCatalog>,
        payload_builder: Arc<dyn PaymentPayloadBuilder>,
        access_service: AccessService,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let reference_generator =
            ReferenceGenerator::new(repository.clone(), config.reference_max_attempts);

        Self {
            repository,
            content_catalog,
            payload_builder,
            access_service,
            reference_generator,
            clock,
            config,
        }
    }

    /// Retries a store call while it fails with a transient error.
    async fn with_store_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(error) if error.is_transient() && attempt < self.config.store_retry_attempts => {
                    warn!(operation, attempt, error = %error, "transient store failure, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
