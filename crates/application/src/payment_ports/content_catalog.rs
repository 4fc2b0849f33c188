use async_trait::async_trait;
use paygate_core::AppResult;
use paygate_domain::{ContentId, ContentOffer, MerchantId, ReceivingAccount};

/// Read-only view on merchant content owned by the content service.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// Finds one content item of a merchant, active or not.
    async fn find_content(
        &self,
        merchant_id: MerchantId,
        content_id: ContentId,
    ) -> AppResult<Option<ContentOffer>>;

    /// Finds one content item by its merchant-relative path, active or not.
    async fn find_content_by_path(
        &self,
        merchant_id: MerchantId,
        path: &str,
    ) -> AppResult<Option<ContentOffer>>;

    /// Finds the bank account receiving the merchant's payments.
    async fn find_receiving_account(
        &self,
        merchant_id: MerchantId,
    ) -> AppResult<Option<ReceivingAccount>>;
}
