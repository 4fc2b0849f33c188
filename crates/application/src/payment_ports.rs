mod access_grant_repository;
mod content_catalog;
mod payload_builder;
mod session_repository;

pub use access_grant_repository::AccessGrantRepository;
pub use content_catalog::ContentCatalog;
pub use payload_builder::PaymentPayloadBuilder;
pub use session_repository::{PaymentSessionRepository, SessionSwap};
