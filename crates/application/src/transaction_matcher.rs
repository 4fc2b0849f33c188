use std::sync::Arc;

use paygate_core::{AppError, AppResult};
use paygate_domain::{
    BankTransactionEvent, CurrencyCode, Money, PaymentReference, PaymentSession, PaymentStatus,
    ReviewId, SessionId, extract_references,
};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::payment_ports::PaymentSessionRepository;
use crate::reconciliation_ports::{
    MatchClassification, ProcessedTransaction, ReviewItem, ReviewQueue, ReviewStatus,
    TransactionLedger,
};
use crate::session_service::{SessionService, SettlementOutcome};

/// What happened to one bank transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The transaction settled a pending session.
    Settled {
        /// Settled session.
        session_id: SessionId,
    },
    /// The transaction was seen before, or its session was already settled.
    DuplicateEvent {
        /// Session linked to the earlier processing, when any.
        session_id: Option<SessionId>,
        /// Whether a different transaction already paid the session.
        second_payment: bool,
    },
    /// No reference found in the remittance text.
    Unmatched,
    /// The remittance text contained more than one distinct reference.
    Ambiguous {
        /// References found, in order of appearance.
        references: Vec<PaymentReference>,
    },
    /// The reference is unknown or its session is closed.
    NoMatchingSession {
        /// Extracted reference.
        reference: PaymentReference,
        /// Session found for the reference, when any.
        session_id: Option<SessionId>,
        /// Status of that session.
        status: Option<PaymentStatus>,
    },
    /// The session exists but amount or currency differ.
    AmountMismatch {
        /// Candidate session.
        session_id: SessionId,
        /// Amount the session expects.
        expected: Money,
        /// Amount received in minor units.
        received_amount_minor: i64,
        /// Currency received.
        received_currency: CurrencyCode,
    },
}

impl MatchOutcome {
    /// Returns the ledger classification of this outcome.
    #[must_use]
    pub fn classification(&self) -> MatchClassification {
        match self {
            Self::Settled { .. } => MatchClassification::Settled,
            Self::DuplicateEvent { .. } => MatchClassification::DuplicateEvent,
            Self::Unmatched => MatchClassification::Unmatched,
            Self::Ambiguous { .. } => MatchClassification::Ambiguous,
            Self::NoMatchingSession { .. } => MatchClassification::NoMatchingSession,
            Self::AmountMismatch { .. } => MatchClassification::AmountMismatch,
        }
    }

    /// Returns the session this outcome relates to.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::Settled { session_id } | Self::AmountMismatch { session_id, .. } => {
                Some(*session_id)
            }
            Self::DuplicateEvent { session_id, .. } | Self::NoMatchingSession { session_id, .. } => {
                *session_id
            }
            Self::Unmatched | Self::Ambiguous { .. } => None,
        }
    }

    /// Returns whether an operator has to look at the transaction.
    #[must_use]
    pub fn requires_review(&self) -> bool {
        match self {
            Self::Settled { .. } => false,
            Self::DuplicateEvent { second_payment, .. } => *second_payment,
            Self::Unmatched
            | Self::Ambiguous { .. }
            | Self::NoMatchingSession { .. }
            | Self::AmountMismatch { .. } => true,
        }
    }

    fn review_detail(&self) -> String {
        match self {
            Self::Settled { session_id } => format!("settled session '{session_id}'"),
            Self::DuplicateEvent { session_id, .. } => match session_id {
                Some(session_id) => {
                    format!("session '{session_id}' was already paid by another transaction")
                }
                None => "transaction already processed".to_owned(),
            },
            Self::Unmatched => "no payment reference in remittance text".to_owned(),
            Self::Ambiguous { references } => format!(
                "remittance text contains {} references: {}",
                references.len(),
                references
                    .iter()
                    .map(PaymentReference::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::NoMatchingSession {
                reference, status, ..
            } => match status {
                Some(status) => format!("session for reference '{reference}' is {status}"),
                None => format!("no session uses reference '{reference}'"),
            },
            Self::AmountMismatch {
                expected,
                received_amount_minor,
                received_currency,
                ..
            } => format!(
                "expected {expected}, received {received_amount_minor} minor units of {received_currency}"
            ),
        }
    }
}

/// Matches bank transactions to payment sessions and settles them.
///
/// Processing is idempotent per bank transaction id.
#[derive(Clone)]
pub struct TransactionMatcher {
    sessions: Arc<dyn PaymentSessionRepository>,
    session_service: SessionService,
    ledger: Arc<dyn TransactionLedger>,
    review_queue: Arc<dyn ReviewQueue>,
    clock: Arc<dyn Clock>,
}

enum Candidate {
    Eligible,
    Closed,
    Mismatch,
}

impl TransactionMatcher {
    /// Creates a transaction matcher.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn PaymentSessionRepository>,
        session_service: SessionService,
        ledger: Arc<dyn TransactionLedger>,
        review_queue: Arc<dyn ReviewQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            session_service,
            ledger,
            review_queue,
            clock,
        }
    }

    /// Classifies one transaction, settles its session when it matches, and
    /// records the result in the ledger.
    ///
    /// Errors leave the ledger untouched so the event can be processed again.
    pub async fn process_event(&self, event: &BankTransactionEvent) -> AppResult<MatchOutcome> {
        if let Some(previous) = self.ledger.find_processed(&event.transaction_id).await? {
            return Ok(MatchOutcome::DuplicateEvent {
                session_id: previous.session_id,
                second_payment: false,
            });
        }

        let outcome = self.classify(event).await?;
        if outcome.requires_review() {
            self.submit_review(event, &outcome).await?;
        }

        let recorded = self
            .ledger
            .record_processed(&ProcessedTransaction {
                event: event.clone(),
                classification: outcome.classification(),
                session_id: outcome.session_id(),
                processed_at: self.clock.now(),
            })
            .await?;
        if !recorded {
            info!(transaction_id = %event.transaction_id, "transaction recorded concurrently");
        }

        info!(
            transaction_id = %event.transaction_id,
            outcome = outcome.classification().as_str(),
            "bank transaction processed"
        );
        Ok(outcome)
    }

    async fn classify(&self, event: &BankTransactionEvent) -> AppResult<MatchOutcome> {
        let mut references = extract_references(&event.remittance_text);
        let reference = match references.len() {
            0 => return Ok(MatchOutcome::Unmatched),
            1 => references.remove(0),
            _ => return Ok(MatchOutcome::Ambiguous { references }),
        };

        let Some(session) = self.sessions.find_session_by_reference(&reference).await? else {
            return Ok(MatchOutcome::NoMatchingSession {
                reference,
                session_id: None,
                status: None,
            });
        };

        match check_candidate(&session, event) {
            Candidate::Closed => {
                return Ok(no_matching_session(reference, &session));
            }
            Candidate::Mismatch => {
                return Ok(MatchOutcome::AmountMismatch {
                    session_id: session.session_id(),
                    expected: session.amount().clone(),
                    received_amount_minor: event.amount_minor,
                    received_currency: event.currency.clone(),
                });
            }
            Candidate::Eligible => {}
        }

        let session_id = session.session_id();
        match self.session_service.settle_session(session_id, event).await {
            Ok(SettlementOutcome::Settled(_)) => Ok(MatchOutcome::Settled { session_id }),
            Ok(SettlementOutcome::AlreadySettled {
                same_transaction, ..
            }) => Ok(MatchOutcome::DuplicateEvent {
                session_id: Some(session_id),
                second_payment: !same_transaction,
            }),
            Err(AppError::Conflict(message)) => {
                // Lost the race against expiry or cancellation.
                info!(session_id = %session_id, message, "settlement rejected");
                let current = self.session_service.get_session(session_id).await?;
                Ok(no_matching_session(reference, &current))
            }
            Err(error) => Err(error),
        }
    }

    async fn submit_review(
        &self,
        event: &BankTransactionEvent,
        outcome: &MatchOutcome,
    ) -> AppResult<()> {
        let item = ReviewItem {
            review_id: ReviewId::new(),
            transaction: event.clone(),
            classification: outcome.classification(),
            session_id: outcome.session_id(),
            detail: outcome.review_detail(),
            status: ReviewStatus::Open,
            created_at: self.clock.now(),
            closed_at: None,
            closed_by: None,
        };

        let queued = self.review_queue.submit_review(&item).await?;
        if queued {
            warn!(
                transaction_id = %event.transaction_id,
                classification = item.classification.as_str(),
                detail = %item.detail,
                "bank transaction queued for manual review"
            );
        }

        Ok(())
    }
}

fn check_candidate(session: &PaymentSession, event: &BankTransactionEvent) -> Candidate {
    match session.status() {
        PaymentStatus::Pending => {
            if session
                .amount()
                .matches_exactly(event.amount_minor, &event.currency)
            {
                Candidate::Eligible
            } else {
                Candidate::Mismatch
            }
        }
        // Settled sessions go through settlement to classify duplicates and resume grants.
        PaymentStatus::Paid | PaymentStatus::AccessGranted => Candidate::Eligible,
        PaymentStatus::Expired | PaymentStatus::Cancelled | PaymentStatus::Failed => {
            Candidate::Closed
        }
    }
}

fn no_matching_session(reference: PaymentReference, session: &PaymentSession) -> MatchOutcome {
    MatchOutcome::NoMatchingSession {
        reference,
        session_id: Some(session.session_id()),
        status: Some(session.status()),
    }
}
