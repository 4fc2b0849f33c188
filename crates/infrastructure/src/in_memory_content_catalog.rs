use std::collections::HashMap;

use async_trait::async_trait;
use paygate_application::ContentCatalog;
use paygate_core::AppResult;
use paygate_domain::{ContentId, ContentOffer, MerchantId, ReceivingAccount};
use tokio::sync::RwLock;

/// In-memory content catalog seeded by tests or local setups.
#[derive(Default)]
pub struct InMemoryContentCatalog {
    offers: RwLock<HashMap<ContentId, ContentOffer>>,
    receiving_accounts: RwLock<HashMap<MerchantId, ReceivingAccount>>,
}

impl InMemoryContentCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a content offer.
    pub async fn upsert_content(&self, offer: ContentOffer) {
        self.offers.write().await.insert(offer.content_id, offer);
    }

    /// Sets the receiving account of a merchant.
    pub async fn set_receiving_account(
        &self,
        merchant_id: MerchantId,
        receiving_account: ReceivingAccount,
    ) {
        self.receiving_accounts
            .write()
            .await
            .insert(merchant_id, receiving_account);
    }
}

#[async_trait]
impl ContentCatalog for InMemoryContentCatalog {
    async fn find_content(
        &self,
        merchant_id: MerchantId,
        content_id: ContentId,
    ) -> AppResult<Option<ContentOffer>> {
        Ok(self
            .offers
            .read()
            .await
            .get(&content_id)
            .filter(|offer| offer.merchant_id == merchant_id)
            .cloned())
    }

    async fn find_content_by_path(
        &self,
        merchant_id: MerchantId,
        path: &str,
    ) -> AppResult<Option<ContentOffer>> {
        Ok(self
            .offers
            .read()
            .await
            .values()
            .find(|offer| offer.merchant_id == merchant_id && offer.path == path)
            .cloned())
    }

    async fn find_receiving_account(
        &self,
        merchant_id: MerchantId,
    ) -> AppResult<Option<ReceivingAccount>> {
        Ok(self
            .receiving_accounts
            .read()
            .await
            .get(&merchant_id)
            .cloned())
    }
}
