//! Application services and ports.

#![forbid(unsafe_code)]

mod access_service;
mod clock;
mod expiry_sweeper;
mod payment_ports;
mod reconciliation_ports;
mod reconciliation_service;
mod reference_generator;
mod review_service;
mod session_service;
mod transaction_matcher;

#[cfg(test)]
mod test_fakes;

pub use access_service::{AccessDecision, AccessService};
pub use clock::{Clock, SystemClock};
pub use expiry_sweeper::{ExpirySweepConfig, ExpirySweeper, SweepReport};
pub use payment_ports::{
    AccessGrantRepository, ContentCatalog, PaymentPayloadBuilder, PaymentSessionRepository,
    SessionSwap,
};
pub use reconciliation_ports::{
    BankFeed, MatchClassification, ProcessedTransaction, ReviewItem, ReviewQueue, ReviewStatus,
    TransactionBatch, TransactionLedger, Watermark, WatermarkStore,
};
pub use reconciliation_service::{CycleReport, ReconciliationConfig, ReconciliationService};
pub use reference_generator::ReferenceGenerator;
pub use review_service::ReviewService;
pub use session_service::{
    CreateSessionInput, ExpiryReport, SessionConfig, SessionService, SessionStatusView,
    SettlementOutcome,
};
pub use transaction_matcher::{MatchOutcome, TransactionMatcher};
