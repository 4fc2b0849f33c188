use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BankConnectionId, BankTransactionId};
use crate::money::CurrencyCode;

/// One incoming transaction observed on an external bank connection.
///
/// Amounts are kept raw: feeds may report debits or zero amounts, which simply
/// never match a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransactionEvent {
    /// Bank-side transaction id, the idempotency key.
    pub transaction_id: BankTransactionId,
    /// Connection the event was fetched from.
    pub connection_id: BankConnectionId,
    /// Amount in minor units.
    pub amount_minor: i64,
    /// Currency code reported by the bank.
    pub currency: CurrencyCode,
    /// Free remittance text, possibly containing a reference.
    pub remittance_text: String,
    /// Time the bank observed the transaction.
    pub observed_at: DateTime<Utc>,
}
