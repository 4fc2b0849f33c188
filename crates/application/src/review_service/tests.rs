use std::sync::Arc;

use paygate_core::AppError;
use paygate_domain::{PaymentStatus, ReviewId};

use super::ReviewService;
use crate::reconciliation_ports::ReviewStatus;
use crate::test_fakes::{Fixture, bank_event};

fn review_service(fixture: &Fixture) -> ReviewService {
    ReviewService::new(
        fixture.reviews.clone(),
        fixture.session_service.clone(),
        Arc::new(fixture.clock.clone()),
    )
}

#[tokio::test]
async fn operator_settles_short_payment_from_review() {
    let fixture = Fixture::new();
    let session = fixture.create_session().await;
    let short = bank_event("tx-1", 240, "EUR", session.reference().as_str());
    fixture
        .matcher
        .process_event(&short)
        .await
        .unwrap_or_else(|_| unreachable!());
    let service = review_service(&fixture);
    let open = service
        .list_open_reviews(10)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(open.len(), 1);

    let settled = service
        .settle_from_review(open[0].review_id, session.session_id(), "ops@example.com")
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(settled.status(), PaymentStatus::AccessGranted);
    assert_eq!(
        settled.settled_by_transaction_id(),
        Some(&short.transaction_id)
    );
    let reviews = fixture.reviews.all().await;
    assert_eq!(reviews[0].status, ReviewStatus::Resolved);
    assert_eq!(reviews[0].closed_by.as_deref(), Some("ops@example.com"));
    assert!(
        service
            .list_open_reviews(10)
            .await
            .unwrap_or_else(|_| unreachable!())
            .is_empty()
    );
}

#[tokio::test]
async fn closed_review_cannot_be_reused() {
    let fixture = Fixture::new();
    let event = bank_event("tx-1", 250, "EUR", "no reference here");
    fixture
        .matcher
        .process_event(&event)
        .await
        .unwrap_or_else(|_| unreachable!());
    let service = review_service(&fixture);
    let review_id = fixture.reviews.all().await[0].review_id;

    let dismissed = service.dismiss_review(review_id, "ops").await;
    let again = service.dismiss_review(review_id, "ops").await;

    assert!(dismissed.is_ok());
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn review_cannot_pay_a_session_settled_by_another_transaction() {
    let fixture = Fixture::new();
    let session = fixture.create_session().await;
    let paid = bank_event("tx-1", 250, "EUR", session.reference().as_str());
    let stray = bank_event("tx-2", 250, "EUR", "payment for article");
    fixture
        .matcher
        .process_event(&paid)
        .await
        .unwrap_or_else(|_| unreachable!());
    fixture
        .matcher
        .process_event(&stray)
        .await
        .unwrap_or_else(|_| unreachable!());
    let service = review_service(&fixture);
    let review_id = fixture.reviews.all().await[0].review_id;

    let result = service
        .settle_from_review(review_id, session.session_id(), "ops")
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(fixture.reviews.all().await[0].status, ReviewStatus::Open);
}

#[tokio::test]
async fn unknown_review_and_blank_reviewer_are_rejected() {
    let fixture = Fixture::new();
    let service = review_service(&fixture);

    let unknown = service.dismiss_review(ReviewId::new(), "ops").await;
    let blank = service.dismiss_review(ReviewId::new(), "  ").await;

    assert!(matches!(unknown, Err(AppError::NotFound(_))));
    assert!(matches!(blank, Err(AppError::Validation(_))));
}
