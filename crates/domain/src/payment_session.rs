//! Payment session aggregate and its status state machine.

use chrono::{DateTime, Duration, Utc};
use paygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::{BankTransactionId, ContentId, MerchantId, SessionId, UserIdentifier};
use crate::money::Money;
use crate::reference::PaymentReference;

/// Lifecycle status of a payment session.
///
/// `pending → paid → access_granted` is the success path; `expired`,
/// `cancelled` and `failed` are reachable from `pending` only. Terminal
/// states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Waiting for a matching bank transaction.
    Pending,
    /// Settled by a validated transaction, access grant not yet recorded.
    Paid,
    /// Settled and access granted.
    AccessGranted,
    /// Expired before any matching transaction was settled.
    Expired,
    /// Cancelled by the payer or merchant.
    Cancelled,
    /// Failed for an administrative reason.
    Failed,
}

impl PaymentStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::AccessGranted => "access_granted",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "access_granted" => Ok(Self::AccessGranted),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown payment status '{value}'"
            ))),
        }
    }

    /// Returns the status exposed to API callers.
    ///
    /// Callers only ever see `pending|paid|expired|cancelled|failed`.
    #[must_use]
    pub fn public_label(&self) -> &'static str {
        match self {
            Self::Paid | Self::AccessGranted => "paid",
            other => other.as_str(),
        }
    }

    /// Returns whether no further transition may leave this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AccessGranted | Self::Expired | Self::Cancelled | Self::Failed
        )
    }

    /// Returns whether this status has been settled by a transaction.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::AccessGranted)
    }

    /// Returns whether `next` is a legal successor of this status.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Paid | Self::Expired | Self::Cancelled | Self::Failed
            ) | (Self::Paid, Self::AccessGranted)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Opaque payment payload (QR content) rendered for the payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload(String);

impl PaymentPayload {
    /// Wraps an already encoded payload.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the encoded payload.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Input for a freshly created pending session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentSession {
    /// Session identifier.
    pub session_id: SessionId,
    /// Owning merchant.
    pub merchant_id: MerchantId,
    /// Paywalled content item.
    pub content_id: ContentId,
    /// Optional caller supplied user identifier.
    pub user_identifier: Option<UserIdentifier>,
    /// Amount due.
    pub amount: Money,
    /// Unique remittance reference.
    pub reference: PaymentReference,
    /// Encoded payment payload.
    pub payload: PaymentPayload,
    /// Access duration granted on settlement, in seconds.
    pub access_duration_seconds: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Full persisted state of a session, used to restore it from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSessionParts {
    /// Creation-time attributes.
    pub session: NewPaymentSession,
    /// Current status.
    pub status: PaymentStatus,
    /// Settlement timestamp.
    pub paid_at: Option<DateTime<Utc>>,
    /// Access grant timestamp.
    pub access_granted_at: Option<DateTime<Utc>>,
    /// Access expiry timestamp.
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Bank transaction that settled the session.
    pub settled_by_transaction_id: Option<BankTransactionId>,
    /// Reason recorded when the session failed.
    pub failure_reason: Option<String>,
}

/// One time-boxed payment intent for one content item.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    session_id: SessionId,
    merchant_id: MerchantId,
    content_id: ContentId,
    user_identifier: Option<UserIdentifier>,
    amount: Money,
    reference: PaymentReference,
    payload: PaymentPayload,
    access_duration_seconds: i64,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    access_granted_at: Option<DateTime<Utc>>,
    access_expires_at: Option<DateTime<Utc>>,
    settled_by_transaction_id: Option<BankTransactionId>,
    failure_reason: Option<String>,
}

impl PaymentSession {
    /// Creates a pending session.
    pub fn new(input: NewPaymentSession) -> AppResult<Self> {
        Self::from_parts(PaymentSessionParts {
            session: input,
            status: PaymentStatus::Pending,
            paid_at: None,
            access_granted_at: None,
            access_expires_at: None,
            settled_by_transaction_id: None,
            failure_reason: None,
        })
    }

    /// Restores a session from persisted state, re-checking every invariant.
    pub fn from_parts(parts: PaymentSessionParts) -> AppResult<Self> {
        let PaymentSessionParts {
            session,
            status,
            paid_at,
            access_granted_at,
            access_expires_at,
            settled_by_transaction_id,
            failure_reason,
        } = parts;

        if session.expires_at <= session.created_at {
            return Err(AppError::Validation(format!(
                "session '{}' must expire after it is created",
                session.session_id
            )));
        }

        if session.access_duration_seconds <= 0 {
            return Err(AppError::Validation(format!(
                "session '{}' access duration must be greater than zero",
                session.session_id
            )));
        }

        if status.is_settled() != (paid_at.is_some() && settled_by_transaction_id.is_some()) {
            return Err(AppError::Validation(format!(
                "session '{}' settlement fields do not match status '{status}'",
                session.session_id
            )));
        }

        let granted = status == PaymentStatus::AccessGranted;
        if granted != (access_granted_at.is_some() && access_expires_at.is_some()) {
            return Err(AppError::Validation(format!(
                "session '{}' access fields do not match status '{status}'",
                session.session_id
            )));
        }

        if let (Some(granted_at), Some(expires_at)) = (access_granted_at, access_expires_at)
            && expires_at <= granted_at
        {
            return Err(AppError::Validation(format!(
                "session '{}' access must expire after it is granted",
                session.session_id
            )));
        }

        Ok(Self {
            session_id: session.session_id,
            merchant_id: session.merchant_id,
            content_id: session.content_id,
            user_identifier: session.user_identifier,
            amount: session.amount,
            reference: session.reference,
            payload: session.payload,
            access_duration_seconds: session.access_duration_seconds,
            status,
            created_at: session.created_at,
            expires_at: session.expires_at,
            paid_at,
            access_granted_at,
            access_expires_at,
            settled_by_transaction_id,
            failure_reason,
        })
    }

    /// Returns the successor state after settlement by one bank transaction.
    pub fn settle(
        &self,
        paid_at: DateTime<Utc>,
        transaction_id: BankTransactionId,
    ) -> AppResult<Self> {
        self.ensure_transition(PaymentStatus::Paid)?;
        let mut next = self.clone();
        next.status = PaymentStatus::Paid;
        next.paid_at = Some(paid_at);
        next.settled_by_transaction_id = Some(transaction_id);
        Ok(next)
    }

    /// Returns the successor state once an access grant exists.
    pub fn record_access_grant(
        &self,
        granted_at: DateTime<Utc>,
        access_expires_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        self.ensure_transition(PaymentStatus::AccessGranted)?;
        if access_expires_at <= granted_at {
            return Err(AppError::Validation(format!(
                "session '{}' access must expire after it is granted",
                self.session_id
            )));
        }

        let mut next = self.clone();
        next.status = PaymentStatus::AccessGranted;
        next.access_granted_at = Some(granted_at);
        next.access_expires_at = Some(access_expires_at);
        Ok(next)
    }

    /// Returns the expired successor state. Fails before the expiry time.
    pub fn expire(&self, now: DateTime<Utc>) -> AppResult<Self> {
        self.ensure_transition(PaymentStatus::Expired)?;
        if now < self.expires_at {
            return Err(AppError::Validation(format!(
                "session '{}' does not expire before {}",
                self.session_id, self.expires_at
            )));
        }

        let mut next = self.clone();
        next.status = PaymentStatus::Expired;
        Ok(next)
    }

    /// Returns the cancelled successor state.
    pub fn cancel(&self) -> AppResult<Self> {
        self.ensure_transition(PaymentStatus::Cancelled)?;
        let mut next = self.clone();
        next.status = PaymentStatus::Cancelled;
        Ok(next)
    }

    /// Returns the failed successor state with a recorded reason.
    pub fn fail(&self, reason: impl Into<String>) -> AppResult<Self> {
        self.ensure_transition(PaymentStatus::Failed)?;
        let mut next = self.clone();
        next.status = PaymentStatus::Failed;
        next.failure_reason = Some(reason.into());
        Ok(next)
    }

    /// Returns whether the expiry time has been reached at `now`.
    #[must_use]
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns the access window granted on settlement.
    #[must_use]
    pub fn access_duration(&self) -> Duration {
        Duration::seconds(self.access_duration_seconds)
    }

    fn ensure_transition(&self, next: PaymentStatus) -> AppResult<()> {
        if self.status.can_transition_to(next) {
            return Ok(());
        }

        Err(AppError::Conflict(format!(
            "invalid transition for session '{}': {} -> {next}",
            self.session_id, self.status
        )))
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the owning merchant.
    #[must_use]
    pub fn merchant_id(&self) -> MerchantId {
        self.merchant_id
    }

    /// Returns the paywalled content item.
    #[must_use]
    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    /// Returns the caller supplied user identifier.
    #[must_use]
    pub fn user_identifier(&self) -> Option<&UserIdentifier> {
        self.user_identifier.as_ref()
    }

    /// Returns the amount due.
    #[must_use]
    pub fn amount(&self) -> &Money {
        &self.amount
    }

    /// Returns the remittance reference.
    #[must_use]
    pub fn reference(&self) -> &PaymentReference {
        &self.reference
    }

    /// Returns the encoded payment payload.
    #[must_use]
    pub fn payload(&self) -> &PaymentPayload {
        &self.payload
    }

    /// Returns the access duration snapshot in seconds.
    #[must_use]
    pub fn access_duration_seconds(&self) -> i64 {
        self.access_duration_seconds
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the expiry timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the settlement timestamp.
    #[must_use]
    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    /// Returns the access grant timestamp.
    #[must_use]
    pub fn access_granted_at(&self) -> Option<DateTime<Utc>> {
        self.access_granted_at
    }

    /// Returns the access expiry timestamp.
    #[must_use]
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_expires_at
    }

    /// Returns the bank transaction that settled the session.
    #[must_use]
    pub fn settled_by_transaction_id(&self) -> Option<&BankTransactionId> {
        self.settled_by_transaction_id.as_ref()
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}
