//! End-to-end payment flows over the in-memory adapters.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use paygate_application::{
    AccessService, Clock, ExpirySweepConfig, ExpirySweeper, MatchClassification,
    ReconciliationConfig, ReconciliationService, ReviewQueue, ReviewService, SessionConfig,
    SessionService, TransactionMatcher,
};
use paygate_core::AppError;
use paygate_domain::{
    BankConnectionId, BankTransactionEvent, BankTransactionId, ContentId, ContentOffer,
    CurrencyCode, MerchantId, Money, PaymentSession, PaymentStatus, ReceivingAccount,
    UserIdentifier,
};

use crate::{
    EpcQrPayloadBuilder, InMemoryAccessGrantRepository, InMemoryBankFeed, InMemoryContentCatalog,
    InMemoryPaymentSessionRepository, InMemoryReconciliationStore,
};

#[derive(Clone)]
struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Gateway {
    clock: ManualClock,
    merchant_id: MerchantId,
    content_id: ContentId,
    feed: Arc<InMemoryBankFeed>,
    store: Arc<InMemoryReconciliationStore>,
    sessions: SessionService,
    access: AccessService,
    reconciliation: ReconciliationService,
    reviews: ReviewService,
    sweeper: ExpirySweeper,
}

impl Gateway {
    async fn start() -> Self {
        let clock = ManualClock {
            now: Arc::new(Mutex::new(
                DateTime::from_timestamp(1_772_366_400, 0).unwrap_or_else(|| unreachable!()),
            )),
        };
        let merchant_id = MerchantId::new();
        let content_id = ContentId::new();

        let catalog = Arc::new(InMemoryContentCatalog::new());
        catalog
            .upsert_content(ContentOffer {
                content_id,
                merchant_id,
                path: "/reports/q1".to_owned(),
                price: Money::new(
                    250,
                    CurrencyCode::new("EUR").unwrap_or_else(|_| unreachable!()),
                )
                .unwrap_or_else(|_| unreachable!()),
                access_duration_seconds: 3600,
                is_active: true,
            })
            .await;
        catalog
            .set_receiving_account(
                merchant_id,
                ReceivingAccount::new("DE89370400440532013000", None, "Example Media GmbH")
                    .unwrap_or_else(|_| unreachable!()),
            )
            .await;

        let session_repository = Arc::new(InMemoryPaymentSessionRepository::new());
        let feed = Arc::new(InMemoryBankFeed::new());
        let store = Arc::new(InMemoryReconciliationStore::new());
        let access = AccessService::new(Arc::new(InMemoryAccessGrantRepository::new()));
        let sessions = SessionService::new(
            session_repository.clone(),
            catalog,
            Arc::new(EpcQrPayloadBuilder::new()),
            access.clone(),
            Arc::new(clock.clone()),
            SessionConfig::default(),
        );
        let matcher = TransactionMatcher::new(
            session_repository,
            sessions.clone(),
            store.clone(),
            store.clone(),
            Arc::new(clock.clone()),
        );
        let reconciliation = ReconciliationService::new(
            feed.clone(),
            store.clone(),
            matcher,
            ReconciliationConfig {
                initial_backoff: StdDuration::from_millis(1),
                max_backoff: StdDuration::from_millis(2),
                ..ReconciliationConfig::default()
            },
        );
        let reviews =
            ReviewService::new(store.clone(), sessions.clone(), Arc::new(clock.clone()));
        let sweeper = ExpirySweeper::new(
            sessions.clone(),
            access.clone(),
            Arc::new(clock.clone()),
            ExpirySweepConfig::default(),
        );

        Self {
            clock,
            merchant_id,
            content_id,
            feed,
            store,
            sessions,
            access,
            reconciliation,
            reviews,
            sweeper,
        }
    }

    async fn open_session(&self) -> PaymentSession {
        self.sessions
            .create_session_for_path(self.merchant_id, "/reports/q1", Some("reader-7".to_owned()))
            .await
            .unwrap_or_else(|_| unreachable!())
    }

    async fn pay(&self, transaction_id: &str, amount_minor: i64, remittance_text: &str) {
        self.feed
            .publish(BankTransactionEvent {
                transaction_id: BankTransactionId::new(transaction_id)
                    .unwrap_or_else(|_| unreachable!()),
                connection_id: connection(),
                amount_minor,
                currency: CurrencyCode::new("EUR").unwrap_or_else(|_| unreachable!()),
                remittance_text: remittance_text.to_owned(),
                observed_at: self.clock.now(),
            })
            .await;
    }

    async fn status(&self, session: &PaymentSession) -> PaymentStatus {
        self.sessions
            .get_session(session.session_id())
            .await
            .unwrap_or_else(|_| unreachable!())
            .status()
    }

    async fn has_access_at(&self, at: DateTime<Utc>) -> bool {
        self.access
            .check_access(self.content_id, &reader(), at)
            .await
            .unwrap_or_else(|_| unreachable!())
            .has_access
    }
}

fn connection() -> BankConnectionId {
    BankConnectionId::new("main-account").unwrap_or_else(|_| unreachable!())
}

fn reader() -> UserIdentifier {
    UserIdentifier::new("reader-7").unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn bank_transfer_unlocks_content_for_the_access_window() {
    let gateway = Gateway::start().await;
    let session = gateway.open_session().await;
    assert!(
        session
            .payload()
            .as_str()
            .ends_with(session.reference().as_str())
    );
    gateway.clock.advance(Duration::minutes(4));
    let paid_at = gateway.clock.now();
    let remittance = format!(
        "Payment {} for report",
        session.reference().as_str().to_lowercase()
    );
    gateway.pay("bank-tx-1", 250, &remittance).await;

    let report = gateway
        .reconciliation
        .run_cycle(&connection())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.settled, 1);
    assert_eq!(gateway.status(&session).await, PaymentStatus::AccessGranted);
    let view = gateway
        .sessions
        .get_session_status(session.session_id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(view.status, "paid");
    assert!(gateway.has_access_at(paid_at).await);
    assert!(
        gateway
            .has_access_at(paid_at + Duration::seconds(3599))
            .await
    );
    assert!(!gateway.has_access_at(paid_at + Duration::seconds(3600)).await);
}

#[tokio::test]
async fn redelivered_transaction_settles_only_once() {
    let gateway = Gateway::start().await;
    let session = gateway.open_session().await;
    gateway
        .pay("bank-tx-1", 250, session.reference().as_str())
        .await;
    gateway
        .reconciliation
        .run_cycle(&connection())
        .await
        .unwrap_or_else(|_| unreachable!());
    gateway
        .pay("bank-tx-1", 250, session.reference().as_str())
        .await;

    let report = gateway
        .reconciliation
        .run_cycle(&connection())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.settled, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.flagged_for_review, 0);
    assert_eq!(gateway.status(&session).await, PaymentStatus::AccessGranted);
}

#[tokio::test]
async fn payment_after_expiry_is_held_for_review() {
    let gateway = Gateway::start().await;
    let session = gateway.open_session().await;
    gateway.clock.advance(Duration::minutes(16));
    let sweep = gateway
        .sweeper
        .sweep_once()
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(sweep.expiry.expired, 1);
    gateway
        .pay("bank-tx-late", 250, session.reference().as_str())
        .await;

    let report = gateway
        .reconciliation
        .run_cycle(&connection())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.flagged_for_review, 1);
    assert_eq!(gateway.status(&session).await, PaymentStatus::Expired);
    assert!(!gateway.has_access_at(gateway.clock.now()).await);
    let reviews = gateway
        .store
        .list_open_reviews(10)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(reviews.len(), 1);
    assert_eq!(
        reviews[0].classification,
        MatchClassification::NoMatchingSession
    );
}

#[tokio::test]
async fn feed_outage_is_retried_within_the_cycle() {
    let gateway = Gateway::start().await;
    let session = gateway.open_session().await;
    gateway
        .pay("bank-tx-1", 250, session.reference().as_str())
        .await;
    gateway
        .feed
        .fail_next_fetch(AppError::Unavailable("bank API returned 503".to_owned()))
        .await;

    let report = gateway
        .reconciliation
        .run_cycle(&connection())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.fetch_attempts, 2);
    assert_eq!(report.settled, 1);
    assert!(report.watermark_advanced);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_settlement_and_expiry_never_both_win() {
    let gateway = Arc::new(Gateway::start().await);
    let mut sessions = Vec::new();
    for _ in 0..16 {
        sessions.push(gateway.open_session().await);
    }
    gateway.clock.advance(Duration::minutes(15));

    let mut tasks = tokio::task::JoinSet::new();
    for (index, session) in sessions.iter().enumerate() {
        let gateway = gateway.clone();
        let session_id = session.session_id();
        let event = BankTransactionEvent {
            transaction_id: BankTransactionId::new(format!("race-{index}"))
                .unwrap_or_else(|_| unreachable!()),
            connection_id: connection(),
            amount_minor: 250,
            currency: CurrencyCode::new("EUR").unwrap_or_else(|_| unreachable!()),
            remittance_text: session.reference().as_str().to_owned(),
            observed_at: gateway.clock.now(),
        };
        tasks.spawn(async move {
            let _ = gateway.sessions.settle_session(session_id, &event).await;
        });
    }
    let expirer = gateway.clone();
    tasks.spawn(async move {
        let _ = expirer.sweeper.sweep_once().await;
    });
    while tasks.join_next().await.is_some() {}

    for session in &sessions {
        let status = gateway.status(session).await;
        let grant = gateway
            .access
            .find_grant_for_session(session)
            .await
            .unwrap_or_else(|_| unreachable!());
        match status {
            PaymentStatus::AccessGranted => assert!(grant.is_some()),
            PaymentStatus::Expired => assert!(grant.is_none()),
            other => panic!("unexpected status {other}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_review_cannot_pay_two_sessions() {
    let gateway = Arc::new(Gateway::start().await);
    let first = gateway.open_session().await;
    let second = gateway.open_session().await;
    gateway.pay("bank-tx-unmarked", 250, "thanks for the report").await;
    gateway
        .reconciliation
        .run_cycle(&connection())
        .await
        .unwrap_or_else(|_| unreachable!());
    let reviews = gateway
        .store
        .list_open_reviews(10)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(reviews.len(), 1);
    let review_id = reviews[0].review_id;

    let mut tasks = tokio::task::JoinSet::new();
    for (session_id, reviewer) in [
        (first.session_id(), "operator-a"),
        (second.session_id(), "operator-b"),
    ] {
        let gateway = gateway.clone();
        tasks.spawn(async move {
            gateway
                .reviews
                .settle_from_review(review_id, session_id, reviewer)
                .await
                .is_ok()
        });
    }
    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap_or_else(|_| unreachable!()) {
            successes += 1;
        }
    }

    let statuses = [
        gateway.status(&first).await,
        gateway.status(&second).await,
    ];
    assert_eq!(successes, 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|status| **status == PaymentStatus::AccessGranted)
            .count(),
        1
    );
    assert!(statuses.contains(&PaymentStatus::Pending));
}
