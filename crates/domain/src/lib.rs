//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access_grant;
mod bank_transaction;
mod content;
mod ids;
mod money;
mod payment_session;
mod reference;

pub use access_grant::{AccessGrant, AccessGrantParts};
pub use bank_transaction::BankTransactionEvent;
pub use content::{ContentOffer, ReceivingAccount};
pub use ids::{
    BankConnectionId, BankTransactionId, ContentId, GrantId, MerchantId, ReviewId, SessionId,
    USER_IDENTIFIER_MAX_LENGTH, UserIdentifier,
};
pub use money::{CurrencyCode, Money};
pub use payment_session::{
    NewPaymentSession, PaymentPayload, PaymentSession, PaymentSessionParts, PaymentStatus,
};
pub use reference::{
    PaymentReference, RANDOM_COMPONENT_LENGTH, REFERENCE_LENGTH, REFERENCE_PREFIX,
    extract_references,
};
