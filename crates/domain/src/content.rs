use paygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::{ContentId, MerchantId};
use crate::money::Money;

/// Paywalled content as seen by the payment core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentOffer {
    /// Content identifier.
    pub content_id: ContentId,
    /// Owning merchant.
    pub merchant_id: MerchantId,
    /// Merchant-relative path of the content.
    pub path: String,
    /// Price of one access window.
    pub price: Money,
    /// Length of the access window in seconds.
    pub access_duration_seconds: i64,
    /// Whether the content can currently be sold.
    pub is_active: bool,
}

/// Bank account receiving payments for a merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingAccount {
    iban: String,
    bic: Option<String>,
    beneficiary_name: String,
}

impl ReceivingAccount {
    /// Creates a receiving account, normalizing the IBAN to compact uppercase form.
    pub fn new(
        iban: impl AsRef<str>,
        bic: Option<String>,
        beneficiary_name: impl Into<String>,
    ) -> AppResult<Self> {
        let iban: String = iban
            .as_ref()
            .chars()
            .filter(|character| !character.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        if iban.len() < 15 || iban.len() > 34 || !iban.bytes().all(|byte| byte.is_ascii_alphanumeric())
        {
            return Err(AppError::Validation(format!(
                "IBAN '{iban}' must be 15 to 34 alphanumeric characters"
            )));
        }

        let beneficiary_name = beneficiary_name.into();
        if beneficiary_name.trim().is_empty() {
            return Err(AppError::Validation(
                "beneficiary name must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            iban,
            bic: bic.filter(|value| !value.trim().is_empty()),
            beneficiary_name,
        })
    }

    /// Returns the compact IBAN.
    #[must_use]
    pub fn iban(&self) -> &str {
        self.iban.as_str()
    }

    /// Returns the BIC, when known.
    #[must_use]
    pub fn bic(&self) -> Option<&str> {
        self.bic.as_deref()
    }

    /// Returns the beneficiary name.
    #[must_use]
    pub fn beneficiary_name(&self) -> &str {
        self.beneficiary_name.as_str()
    }
}
