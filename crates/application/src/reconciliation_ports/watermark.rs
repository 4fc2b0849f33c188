use async_trait::async_trait;
use paygate_core::{AppError, AppResult};
use paygate_domain::BankConnectionId;
use serde::{Deserialize, Serialize};

/// Opaque feed position after which transactions have been fully processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark(String);

impl Watermark {
    /// Creates a non-empty watermark.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "watermark must not be empty".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the raw feed position.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Durable per-connection reconciliation position.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Loads the stored position for a connection.
    async fn load_watermark(&self, connection_id: &BankConnectionId)
    -> AppResult<Option<Watermark>>;

    /// Replaces the stored position for a connection.
    async fn store_watermark(
        &self,
        connection_id: &BankConnectionId,
        watermark: &Watermark,
    ) -> AppResult<()>;
}
