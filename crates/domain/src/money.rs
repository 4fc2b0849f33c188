//! Amounts in integer minor units and ISO 4217 currency codes.

use paygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Three-letter uppercase ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses a currency code, normalizing ASCII case.
    pub fn new(value: impl AsRef<str>) -> AppResult<Self> {
        let normalized = value.as_ref().trim().to_ascii_uppercase();
        if normalized.len() != 3 || !normalized.bytes().all(|byte| byte.is_ascii_uppercase()) {
            return Err(AppError::Validation(format!(
                "currency code '{}' must be three ASCII letters",
                value.as_ref()
            )));
        }

        Ok(Self(normalized))
    }

    /// Returns the code as stored and compared.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Positive amount of money in minor units (cents for EUR).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: CurrencyCode,
}

impl Money {
    /// Creates a money value. Amounts must be strictly positive.
    pub fn new(amount_minor: i64, currency: CurrencyCode) -> AppResult<Self> {
        if amount_minor <= 0 {
            return Err(AppError::Validation(format!(
                "amount must be greater than zero, got {amount_minor}"
            )));
        }

        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    /// Returns the currency code.
    #[must_use]
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Exact equality on both amount and currency.
    #[must_use]
    pub fn matches_exactly(&self, amount_minor: i64, currency: &CurrencyCode) -> bool {
        self.amount_minor == amount_minor && &self.currency == currency
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}.{:02} {}",
            self.amount_minor / 100,
            self.amount_minor % 100,
            self.currency
        )
    }
}
