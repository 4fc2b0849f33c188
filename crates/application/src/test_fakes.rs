//! In-memory port fakes shared by service tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use paygate_core::{AppError, AppResult};
use paygate_domain::{
    AccessGrant, AccessGrantParts, BankConnectionId, BankTransactionEvent, BankTransactionId,
    ContentId, ContentOffer, CurrencyCode, GrantId, MerchantId, Money, PaymentPayload,
    PaymentReference, PaymentSession, PaymentStatus, ReceivingAccount, ReviewId, SessionId,
    UserIdentifier,
};

use crate::access_service::AccessService;
use crate::clock::Clock;
use crate::payment_ports::{
    AccessGrantRepository, ContentCatalog, PaymentPayloadBuilder, PaymentSessionRepository,
    SessionSwap,
};
use crate::reconciliation_ports::{
    BankFeed, ProcessedTransaction, ReviewItem, ReviewQueue, ReviewStatus, TransactionBatch,
    TransactionLedger, Watermark, WatermarkStore,
};
use crate::session_service::{CreateSessionInput, SessionConfig, SessionService};
use crate::transaction_matcher::TransactionMatcher;

#[derive(Clone)]
pub(crate) struct FixedClock {
    now: Arc<StdMutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(StdMutex::new(now)),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub(crate) struct FakeSessionRepository {
    sessions: Mutex<HashMap<SessionId, PaymentSession>>,
    every_reference_taken: Mutex<bool>,
    reference_lookups: Mutex<usize>,
    failing_swaps: Mutex<u32>,
}

impl FakeSessionRepository {
    pub(crate) async fn report_every_reference_taken(&self) {
        *self.every_reference_taken.lock().await = true;
    }

    pub(crate) async fn reference_lookups(&self) -> usize {
        *self.reference_lookups.lock().await
    }

    pub(crate) async fn fail_next_swaps(&self, count: u32) {
        *self.failing_swaps.lock().await = count;
    }

    pub(crate) async fn overwrite(&self, session: PaymentSession) {
        self.sessions
            .lock()
            .await
            .insert(session.session_id(), session);
    }

    pub(crate) async fn stored(&self, session_id: SessionId) -> Option<PaymentSession> {
        self.sessions.lock().await.get(&session_id).cloned()
    }
}

#[async_trait]
impl PaymentSessionRepository for FakeSessionRepository {
    async fn insert_session(&self, session: &PaymentSession) -> AppResult<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.session_id())
            || sessions
                .values()
                .any(|stored| stored.reference() == session.reference())
        {
            return Err(AppError::Conflict("duplicate session".to_owned()));
        }

        sessions.insert(session.session_id(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: SessionId) -> AppResult<Option<PaymentSession>> {
        Ok(self.stored(session_id).await)
    }

    async fn find_session_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> AppResult<Option<PaymentSession>> {
        Ok(self
            .sessions
            .lock()
            .await
            .values()
            .find(|session| session.reference() == reference)
            .cloned())
    }

    async fn reference_exists(&self, reference: &PaymentReference) -> AppResult<bool> {
        *self.reference_lookups.lock().await += 1;
        if *self.every_reference_taken.lock().await {
            return Ok(true);
        }

        Ok(self
            .sessions
            .lock()
            .await
            .values()
            .any(|session| session.reference() == reference))
    }

    async fn compare_and_swap_status(
        &self,
        expected: PaymentStatus,
        next: &PaymentSession,
    ) -> AppResult<SessionSwap> {
        {
            let mut failing = self.failing_swaps.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(AppError::Unavailable("store busy".to_owned()));
            }
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(transaction_id) = next.settled_by_transaction_id()
            && sessions.values().any(|stored| {
                stored.session_id() != next.session_id()
                    && stored.settled_by_transaction_id() == Some(transaction_id)
            })
        {
            return Err(AppError::Conflict("transaction already settled".to_owned()));
        }

        let current = sessions
            .get(&next.session_id())
            .cloned()
            .ok_or_else(|| AppError::NotFound("session missing".to_owned()))?;
        if current.status() != expected {
            return Ok(SessionSwap::Rejected { current });
        }

        sessions.insert(next.session_id(), next.clone());
        Ok(SessionSwap::Applied)
    }

    async fn list_expirable_sessions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|session| {
                session.status() == PaymentStatus::Pending && session.expires_at() <= now
            })
            .cloned()
            .collect();
        sessions.sort_by_key(PaymentSession::expires_at);
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn list_sessions_with_status(
        &self,
        status: PaymentStatus,
        limit: usize,
    ) -> AppResult<Vec<PaymentSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|session| session.status() == status)
            .cloned()
            .collect();
        sessions.sort_by_key(PaymentSession::created_at);
        sessions.truncate(limit);
        Ok(sessions)
    }
}

#[derive(Default)]
pub(crate) struct FakeGrantRepository {
    grants: Mutex<Vec<AccessGrant>>,
    fail_record_access: Mutex<bool>,
}

impl FakeGrantRepository {
    pub(crate) async fn fail_record_access(&self) {
        *self.fail_record_access.lock().await = true;
    }

    pub(crate) async fn all(&self) -> Vec<AccessGrant> {
        self.grants.lock().await.clone()
    }
}

#[async_trait]
impl AccessGrantRepository for FakeGrantRepository {
    async fn insert_grant(&self, grant: &AccessGrant) -> AppResult<()> {
        let mut grants = self.grants.lock().await;
        if grants
            .iter()
            .any(|stored| stored.session_id() == grant.session_id())
        {
            return Err(AppError::Conflict("duplicate grant".to_owned()));
        }

        grants.push(grant.clone());
        Ok(())
    }

    async fn find_grant_for_session(
        &self,
        session_id: SessionId,
    ) -> AppResult<Option<AccessGrant>> {
        Ok(self
            .grants
            .lock()
            .await
            .iter()
            .find(|grant| grant.session_id() == session_id)
            .cloned())
    }

    async fn find_latest_active_grant(
        &self,
        content_id: ContentId,
        user_identifier: &UserIdentifier,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AccessGrant>> {
        Ok(self
            .grants
            .lock()
            .await
            .iter()
            .filter(|grant| {
                grant.content_id() == content_id
                    && grant.user_identifier() == user_identifier
                    && grant.is_active()
                    && grant.expires_at() > now
            })
            .max_by_key(|grant| grant.expires_at())
            .cloned())
    }

    async fn record_access(&self, grant_id: GrantId, accessed_at: DateTime<Utc>) -> AppResult<()> {
        if *self.fail_record_access.lock().await {
            return Err(AppError::Unavailable("grant store busy".to_owned()));
        }

        let mut grants = self.grants.lock().await;
        if let Some(grant) = grants.iter_mut().find(|grant| grant.grant_id() == grant_id) {
            *grant = grant.with_recorded_access(accessed_at);
        }
        Ok(())
    }

    async fn deactivate_expired_grants(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut grants = self.grants.lock().await;
        let mut deactivated = 0;
        for grant in grants.iter_mut() {
            if grant.is_active() && grant.expires_at() <= now {
                *grant = AccessGrant::from_parts(AccessGrantParts {
                    grant_id: grant.grant_id(),
                    session_id: grant.session_id(),
                    merchant_id: grant.merchant_id(),
                    content_id: grant.content_id(),
                    user_identifier: grant.user_identifier().clone(),
                    granted_at: grant.granted_at(),
                    expires_at: grant.expires_at(),
                    access_count: grant.access_count(),
                    last_accessed_at: grant.last_accessed_at(),
                    is_active: false,
                })?;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }
}

pub(crate) struct FakeContentCatalog {
    offers: Vec<ContentOffer>,
    receiving_account: Option<ReceivingAccount>,
}

#[async_trait]
impl ContentCatalog for FakeContentCatalog {
    async fn find_content(
        &self,
        merchant_id: MerchantId,
        content_id: ContentId,
    ) -> AppResult<Option<ContentOffer>> {
        Ok(self
            .offers
            .iter()
            .find(|offer| offer.merchant_id == merchant_id && offer.content_id == content_id)
            .cloned())
    }

    async fn find_content_by_path(
        &self,
        merchant_id: MerchantId,
        path: &str,
    ) -> AppResult<Option<ContentOffer>> {
        Ok(self
            .offers
            .iter()
            .find(|offer| offer.merchant_id == merchant_id && offer.path == path)
            .cloned())
    }

    async fn find_receiving_account(
        &self,
        _merchant_id: MerchantId,
    ) -> AppResult<Option<ReceivingAccount>> {
        Ok(self.receiving_account.clone())
    }
}

pub(crate) struct StubPayloadBuilder;

impl PaymentPayloadBuilder for StubPayloadBuilder {
    fn build_payload(
        &self,
        amount: &Money,
        reference: &PaymentReference,
        receiving_account: &ReceivingAccount,
    ) -> AppResult<PaymentPayload> {
        Ok(PaymentPayload::new(format!(
            "{}|{amount}|{reference}",
            receiving_account.iban()
        )))
    }
}

#[derive(Default)]
pub(crate) struct FakeLedger {
    records: Mutex<HashMap<BankTransactionId, ProcessedTransaction>>,
    failing_records: Mutex<u32>,
}

impl FakeLedger {
    pub(crate) async fn fail_next_records(&self, count: u32) {
        *self.failing_records.lock().await = count;
    }

    pub(crate) async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl TransactionLedger for FakeLedger {
    async fn find_processed(
        &self,
        transaction_id: &BankTransactionId,
    ) -> AppResult<Option<ProcessedTransaction>> {
        Ok(self.records.lock().await.get(transaction_id).cloned())
    }

    async fn record_processed(&self, record: &ProcessedTransaction) -> AppResult<bool> {
        {
            let mut failing = self.failing_records.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(AppError::Unavailable("ledger busy".to_owned()));
            }
        }

        let mut records = self.records.lock().await;
        if records.contains_key(&record.event.transaction_id) {
            return Ok(false);
        }
        records.insert(record.event.transaction_id.clone(), record.clone());
        Ok(true)
    }
}

#[derive(Default)]
pub(crate) struct FakeReviewQueue {
    items: Mutex<Vec<ReviewItem>>,
}

impl FakeReviewQueue {
    pub(crate) async fn all(&self) -> Vec<ReviewItem> {
        self.items.lock().await.clone()
    }
}

#[async_trait]
impl ReviewQueue for FakeReviewQueue {
    async fn submit_review(&self, item: &ReviewItem) -> AppResult<bool> {
        let mut items = self.items.lock().await;
        if items
            .iter()
            .any(|stored| stored.transaction.transaction_id == item.transaction.transaction_id)
        {
            return Ok(false);
        }
        items.push(item.clone());
        Ok(true)
    }

    async fn find_review(&self, review_id: ReviewId) -> AppResult<Option<ReviewItem>> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .find(|item| item.review_id == review_id)
            .cloned())
    }

    async fn list_open_reviews(&self, limit: usize) -> AppResult<Vec<ReviewItem>> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .filter(|item| item.status == ReviewStatus::Open)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn close_review(
        &self,
        review_id: ReviewId,
        status: ReviewStatus,
        closed_by: &str,
        closed_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut items = self.items.lock().await;
        let Some(item) = items
            .iter_mut()
            .find(|item| item.review_id == review_id && item.status == ReviewStatus::Open)
        else {
            return Ok(false);
        };

        item.status = status;
        item.closed_by = Some(closed_by.to_owned());
        item.closed_at = Some(closed_at);
        Ok(true)
    }
}

#[derive(Default)]
pub(crate) struct FakeWatermarkStore {
    watermarks: Mutex<HashMap<BankConnectionId, Watermark>>,
}

impl FakeWatermarkStore {
    pub(crate) async fn current(&self, connection_id: &BankConnectionId) -> Option<Watermark> {
        self.watermarks.lock().await.get(connection_id).cloned()
    }
}

#[async_trait]
impl WatermarkStore for FakeWatermarkStore {
    async fn load_watermark(
        &self,
        connection_id: &BankConnectionId,
    ) -> AppResult<Option<Watermark>> {
        Ok(self.current(connection_id).await)
    }

    async fn store_watermark(
        &self,
        connection_id: &BankConnectionId,
        watermark: &Watermark,
    ) -> AppResult<()> {
        self.watermarks
            .lock()
            .await
            .insert(connection_id.clone(), watermark.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct ScriptedBankFeed {
    responses: Mutex<VecDeque<AppResult<TransactionBatch>>>,
    requested_watermarks: Mutex<Vec<Option<Watermark>>>,
    delay: Option<StdDuration>,
}

impl ScriptedBankFeed {
    pub(crate) fn with_delay(delay: StdDuration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) async fn push(&self, response: AppResult<TransactionBatch>) {
        self.responses.lock().await.push_back(response);
    }

    pub(crate) async fn requested_watermarks(&self) -> Vec<Option<Watermark>> {
        self.requested_watermarks.lock().await.clone()
    }
}

#[async_trait]
impl BankFeed for ScriptedBankFeed {
    async fn fetch_transactions_since(
        &self,
        _connection_id: &BankConnectionId,
        watermark: Option<&Watermark>,
        _limit: usize,
    ) -> AppResult<TransactionBatch> {
        self.requested_watermarks
            .lock()
            .await
            .push(watermark.cloned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(TransactionBatch::default()))
    }
}

pub(crate) fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_772_366_400, 0).unwrap_or_else(|| unreachable!())
}

pub(crate) fn eur(amount_minor: i64) -> Money {
    let currency = CurrencyCode::new("EUR").unwrap_or_else(|_| unreachable!());
    Money::new(amount_minor, currency).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn connection() -> BankConnectionId {
    BankConnectionId::new("conn-main").unwrap_or_else(|_| unreachable!())
}

pub(crate) fn bank_event(
    transaction_id: &str,
    amount_minor: i64,
    currency: &str,
    remittance_text: &str,
) -> BankTransactionEvent {
    BankTransactionEvent {
        transaction_id: BankTransactionId::new(transaction_id).unwrap_or_else(|_| unreachable!()),
        connection_id: connection(),
        amount_minor,
        currency: CurrencyCode::new(currency).unwrap_or_else(|_| unreachable!()),
        remittance_text: remittance_text.to_owned(),
        observed_at: start_time(),
    }
}

/// Services wired to fresh fakes around one 2.50 EUR article with a one hour window.
pub(crate) struct Fixture {
    pub(crate) clock: FixedClock,
    pub(crate) sessions: Arc<FakeSessionRepository>,
    pub(crate) grants: Arc<FakeGrantRepository>,
    pub(crate) ledger: Arc<FakeLedger>,
    pub(crate) reviews: Arc<FakeReviewQueue>,
    pub(crate) content: ContentOffer,
    pub(crate) inactive_content: ContentOffer,
    pub(crate) access_service: AccessService,
    pub(crate) session_service: SessionService,
    pub(crate) matcher: TransactionMatcher,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_receiving_account(Some(
            ReceivingAccount::new("DE89 3704 0044 0532 0130 00", None, "Example Media GmbH")
                .unwrap_or_else(|_| unreachable!()),
        ))
    }

    pub(crate) fn with_receiving_account(receiving_account: Option<ReceivingAccount>) -> Self {
        let clock = FixedClock::new(start_time());
        let merchant_id = MerchantId::new();
        let content = ContentOffer {
            content_id: ContentId::new(),
            merchant_id,
            path: "/articles/deep-dive".to_owned(),
            price: eur(250),
            access_duration_seconds: 3600,
            is_active: true,
        };
        let inactive_content = ContentOffer {
            content_id: ContentId::new(),
            merchant_id,
            path: "/articles/retired".to_owned(),
            price: eur(100),
            access_duration_seconds: 3600,
            is_active: false,
        };

        let sessions = Arc::new(FakeSessionRepository::default());
        let grants = Arc::new(FakeGrantRepository::default());
        let ledger = Arc::new(FakeLedger::default());
        let reviews = Arc::new(FakeReviewQueue::default());
        let catalog = Arc::new(FakeContentCatalog {
            offers: vec![content.clone(), inactive_content.clone()],
            receiving_account,
        });

        let access_service = AccessService::new(grants.clone());
        let session_service = SessionService::new(
            sessions.clone(),
            catalog,
            Arc::new(StubPayloadBuilder),
            access_service.clone(),
            Arc::new(clock.clone()),
            SessionConfig::default(),
        );
        let matcher = TransactionMatcher::new(
            sessions.clone(),
            session_service.clone(),
            ledger.clone(),
            reviews.clone(),
            Arc::new(clock.clone()),
        );

        Self {
            clock,
            sessions,
            grants,
            ledger,
            reviews,
            content,
            inactive_content,
            access_service,
            session_service,
            matcher,
        }
    }

    pub(crate) fn create_input(&self, user_identifier: Option<&str>) -> CreateSessionInput {
        CreateSessionInput {
            merchant_id: self.content.merchant_id,
            content_id: self.content.content_id,
            user_identifier: user_identifier.map(str::to_owned),
            amount_minor: self.content.price.amount_minor(),
            currency: self.content.price.currency().as_str().to_owned(),
        }
    }

    pub(crate) async fn create_session(&self) -> PaymentSession {
        self.session_service
            .create_session(self.create_input(Some("reader@example.com")))
            .await
            .unwrap_or_else(|_| unreachable!())
    }

    pub(crate) async fn stored_status(&self, session_id: SessionId) -> Option<PaymentStatus> {
        self.sessions
            .stored(session_id)
            .await
            .map(|session| session.status())
    }

    pub(crate) async fn grant_for(&self, session_id: SessionId) -> Option<AccessGrant> {
        self.grants
            .all()
            .await
            .into_iter()
            .find(|grant| grant.session_id() == session_id)
    }

    /// Simulates a crash between settlement and grant creation.
    pub(crate) async fn mark_paid_without_grant(&self, session: &PaymentSession) {
        let transaction_id = BankTransactionId::new("tx-crashed").unwrap_or_else(|_| unreachable!());
        let paid = session
            .settle(self.clock.now(), transaction_id)
            .unwrap_or_else(|_| unreachable!());
        self.sessions.overwrite(paid).await;
    }
}
