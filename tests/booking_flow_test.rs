mod common;

use common::{CUSTOMER, Platform, settlement};
use homecare_ledger::domain::ids::UserId;
use homecare_ledger::domain::journal::{JournalPayload, Vitals};
use homecare_ledger::domain::money::Money;
use homecare_ledger::domain::notification::NotificationKind;
use homecare_ledger::domain::order::OrderStatus;
use homecare_ledger::domain::wallet::{BankDetails, Decision, TransactionKind, TransactionStatus};
use homecare_ledger::error::BookingError;
use rust_decimal_macros::dec;

const NURSE: UserId = UserId(100);

fn bank() -> BankDetails {
    BankDetails {
        bank: "BCA".to_string(),
        account_number: "0123456789".to_string(),
    }
}

#[tokio::test]
async fn test_order_to_payout_to_withdrawal() {
    let policy = homecare_ledger::config::BookingPolicy::new(dec!(10), dec!(0.85)).unwrap();
    let platform = Platform::with_policy(policy);
    let service = platform.service(dec!(100), dec!(10)).await;
    platform.partner(NURSE).await;

    let placed = platform.book(&service, 9, 2).await;
    assert_eq!(placed.order.total_amount.value(), dec!(110));
    assert_eq!(placed.order.status, OrderStatus::PendingPayment);

    platform.settle(&placed.order.order_no).await;
    let claimed = platform
        .orders
        .claim_order(NURSE, placed.order.id)
        .await
        .unwrap();
    assert_eq!(claimed.status, OrderStatus::Assigned);

    let journal = JournalPayload {
        vitals: Vitals {
            blood_pressure: "120/80".to_string(),
            temperature: "36.6".to_string(),
            pulse: "72".to_string(),
        },
        notes: "Wound dressing changed".to_string(),
        photo_url: String::new(),
    };
    let receipt = platform
        .orders
        .complete_order(placed.order.id, journal)
        .await
        .unwrap();
    assert_eq!(receipt.payout.value(), dec!(85));
    assert_eq!(receipt.transaction.kind, TransactionKind::Income);
    assert_eq!(receipt.transaction.status, TransactionStatus::Success);
    assert_eq!(platform.wallets.balance(NURSE).await.unwrap().0, dec!(85));

    let detail = platform
        .orders
        .order_detail(CUSTOMER, placed.order.id)
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::Completed);
    assert_eq!(detail.journal.unwrap().notes, "Wound dressing changed");

    let withdrawal = platform
        .wallets
        .request_withdrawal(NURSE, Money::new(dec!(50)).unwrap(), bank())
        .await
        .unwrap();
    assert_eq!(withdrawal.status, TransactionStatus::Pending);
    assert_eq!(platform.wallets.balance(NURSE).await.unwrap().0, dec!(35));

    let rejected = platform
        .wallets
        .resolve_withdrawal(withdrawal.id, Decision::Reject)
        .await
        .unwrap();
    assert_eq!(rejected.status, TransactionStatus::Failed);
    assert_eq!(platform.wallets.balance(NURSE).await.unwrap().0, dec!(85));

    let again = platform
        .wallets
        .resolve_withdrawal(withdrawal.id, Decision::Approve)
        .await;
    assert!(matches!(again, Err(BookingError::AlreadyProcessed(_))));
    assert!(again.unwrap_err().is_invalid_state());
    assert_eq!(platform.wallets.balance(NURSE).await.unwrap().0, dec!(85));

    assert!(platform.wallets.audit(NURSE).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_webhook_replay_notifies_once() {
    let platform = Platform::new();
    let service = platform.service(dec!(100), dec!(10)).await;
    platform.partner(NURSE).await;
    platform
        .catalog
        .register_device(CUSTOMER, "customer-phone".to_string())
        .await
        .unwrap();
    platform
        .catalog
        .register_device(NURSE, "nurse-phone".to_string())
        .await
        .unwrap();

    let placed = platform.book(&service, 9, 2).await;
    let event = settlement(&placed.order.order_no);
    let first = platform.reconciler.apply_gateway_event(&event).await.unwrap();
    let second = platform.reconciler.apply_gateway_event(&event).await.unwrap();
    assert!(first.transitioned);
    assert!(!second.transitioned);
    assert_eq!(second.order.status, OrderStatus::Paid);

    let sent = platform.notifier.sent().await;
    let payment: Vec<_> = sent
        .iter()
        .filter(|n| n.kind == NotificationKind::PaymentSuccess)
        .collect();
    assert_eq!(payment.len(), 1);
    assert_eq!(payment[0].device_token, "customer-phone");
    assert_eq!(
        sent.iter()
            .filter(|n| n.kind == NotificationKind::NewOrderOpen)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_schedule_overlap_blocks_second_claim() {
    let platform = Platform::new();
    let service = platform.service(dec!(100), dec!(10)).await;
    platform.partner(NURSE).await;

    let morning = platform.book(&service, 10, 2).await;
    let overlapping = platform.book(&service, 11, 2).await;
    let back_to_back = platform.book(&service, 12, 2).await;
    for placed in [&morning, &overlapping, &back_to_back] {
        platform.settle(&placed.order.order_no).await;
    }

    platform
        .orders
        .claim_order(NURSE, morning.order.id)
        .await
        .unwrap();
    let conflict = platform
        .orders
        .claim_order(NURSE, overlapping.order.id)
        .await;
    assert!(matches!(conflict, Err(BookingError::ScheduleConflict(_))));
    assert_eq!(
        platform.orders.order(overlapping.order.id).await.unwrap().status,
        OrderStatus::Paid
    );

    platform
        .orders
        .claim_order(NURSE, back_to_back.order.id)
        .await
        .unwrap();

    // Completed visits no longer block the calendar.
    platform
        .orders
        .complete_order(morning.order.id, JournalPayload::default())
        .await
        .unwrap();
    platform
        .orders
        .complete_order(back_to_back.order.id, JournalPayload::default())
        .await
        .unwrap();
    platform
        .orders
        .claim_order(NURSE, overlapping.order.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_direct_booking_flow() {
    let platform = Platform::new();
    let service = platform.service(dec!(200), dec!(20)).await;
    let chosen = platform.partner(NURSE).await;
    platform.partner(UserId(200)).await;

    let placed = platform.book_for(&service, 9, 3, Some(chosen.id)).await;
    platform.settle(&placed.order.order_no).await;
    assert!(platform.orders.available_orders().await.unwrap().is_empty());

    assert!(matches!(
        platform.orders.claim_order(UserId(200), placed.order.id).await,
        Err(BookingError::Forbidden(_))
    ));

    let cancelled = platform
        .orders
        .reject_order(NURSE, placed.order.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(matches!(
        platform.orders.claim_order(NURSE, placed.order.id).await,
        Err(BookingError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_completion_requires_assigned_partner() {
    let platform = Platform::new();
    let service = platform.service(dec!(100), dec!(10)).await;
    platform.partner(NURSE).await;
    platform.partner(UserId(200)).await;

    let placed = platform.book(&service, 9, 2).await;
    platform.settle(&placed.order.order_no).await;
    platform
        .orders
        .claim_order(NURSE, placed.order.id)
        .await
        .unwrap();
    platform
        .orders
        .start_visit(NURSE, placed.order.id)
        .await
        .unwrap();

    assert!(matches!(
        platform
            .orders
            .complete_assigned(UserId(200), placed.order.id, JournalPayload::default())
            .await,
        Err(BookingError::Forbidden(_))
    ));

    let receipt = platform
        .orders
        .complete_assigned(NURSE, placed.order.id, JournalPayload::default())
        .await
        .unwrap();
    assert_eq!(receipt.order.status, OrderStatus::Completed);
    assert_eq!(platform.orders.partner_jobs(NURSE).await.unwrap().len(), 1);
}
