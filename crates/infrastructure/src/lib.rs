//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod epc_qr_payload_builder;
mod http_bank_feed;
mod in_memory_access_grant_repository;
mod in_memory_bank_feed;
mod in_memory_content_catalog;
mod in_memory_payment_session_repository;
mod in_memory_reconciliation_store;
mod postgres_access_grant_repository;
mod postgres_content_catalog;
mod postgres_error;
mod postgres_payment_session_repository;
mod postgres_reconciliation_store;

#[cfg(test)]
mod in_memory_scenarios;

pub use epc_qr_payload_builder::EpcQrPayloadBuilder;
pub use http_bank_feed::HttpBankFeed;
pub use in_memory_access_grant_repository::InMemoryAccessGrantRepository;
pub use in_memory_bank_feed::InMemoryBankFeed;
pub use in_memory_content_catalog::InMemoryContentCatalog;
pub use in_memory_payment_session_repository::InMemoryPaymentSessionRepository;
pub use in_memory_reconciliation_store::InMemoryReconciliationStore;
pub use postgres_access_grant_repository::PostgresAccessGrantRepository;
pub use postgres_content_catalog::PostgresContentCatalog;
pub use postgres_payment_session_repository::PostgresPaymentSessionRepository;
pub use postgres_reconciliation_store::PostgresReconciliationStore;
