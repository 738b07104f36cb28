//! Payment Reconciliation: applies asynchronous gateway callbacks to orders.
//!
//! Callbacks can arrive more than once and out of order. An event only has an
//! effect when it moves the order along an allowed transition, so replays are
//! harmless and notifications go out once per real change.

use super::notify::{deliver, token_of};
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{NotifierHandle, OrderChange, StoreHandle, UnitOfWork};
use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The callback body the payment gateway posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub order_no: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutcome {
    pub order: Order,
    /// False when the event was a replay or arrived out of order.
    pub transitioned: bool,
}

/// The body returned to the gateway. It is the same whatever happened, so
/// the gateway stops retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
    pub status: &'static str,
}

/// Maps gateway statuses onto order statuses. Anything unrecognised keeps
/// the order waiting for payment.
pub fn target_status(transaction_status: &str, fraud_status: Option<&str>) -> OrderStatus {
    match (transaction_status, fraud_status) {
        ("capture", Some("accept")) => OrderStatus::Paid,
        ("capture", _) => OrderStatus::PendingPayment,
        ("settlement", _) => OrderStatus::Paid,
        ("deny" | "cancel" | "expire", _) => OrderStatus::Cancelled,
        _ => OrderStatus::PendingPayment,
    }
}

pub struct PaymentReconciler {
    store: StoreHandle,
    notifier: NotifierHandle,
}

impl PaymentReconciler {
    pub fn new(store: StoreHandle, notifier: NotifierHandle) -> Self {
        Self { store, notifier }
    }

    pub async fn apply_gateway_event(&self, event: &GatewayEvent) -> Result<ReconciliationOutcome> {
        let target = target_status(&event.transaction_status, event.fraud_status.as_deref());

        let mut uow = self.store.begin().await?;
        let order = uow
            .order_by_no(&event.order_no)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Order {}", event.order_no)))?;

        if order.status == target {
            info!(order_no = %order.order_no, status = %order.status, "gateway event replayed");
            return Ok(ReconciliationOutcome {
                order,
                transitioned: false,
            });
        }
        if !order.status.can_transition_to(target) {
            warn!(
                order_no = %order.order_no,
                current = %order.status,
                target = %target,
                gateway_status = %event.transaction_status,
                "gateway event ignored"
            );
            return Ok(ReconciliationOutcome {
                order,
                transitioned: false,
            });
        }

        let Some(updated) = uow
            .compare_and_set_order(order.id, order.status, OrderChange::status(target))
            .await?
        else {
            return Ok(ReconciliationOutcome {
                order,
                transitioned: false,
            });
        };
        let notifications = fan_out(uow.as_mut(), &updated).await?;
        uow.commit().await?;
        drop(uow);

        info!(
            order_no = %updated.order_no,
            from = %order.status,
            to = %updated.status,
            recipients = notifications.len(),
            "order reconciled"
        );
        deliver(self.notifier.as_ref(), notifications).await;

        Ok(ReconciliationOutcome {
            order: updated,
            transitioned: true,
        })
    }

    /// Applies the event and always acknowledges it. Failures are logged.
    pub async fn acknowledge(&self, event: &GatewayEvent) -> Acknowledgement {
        if let Err(err) = self.apply_gateway_event(event).await {
            warn!(order_no = %event.order_no, error = %err, "gateway event not applied");
        }
        Acknowledgement { status: "ok" }
    }
}

/// Who hears about a status change. Users without a device token are skipped.
async fn fan_out(uow: &mut dyn UnitOfWork, order: &Order) -> Result<Vec<Notification>> {
    let mut notifications = Vec::new();
    match order.status {
        OrderStatus::Paid => {
            if let Some(token) = token_of(uow, order.customer_id).await? {
                notifications.push(Notification::for_order(
                    token,
                    NotificationKind::PaymentSuccess,
                    order.id,
                ));
            }
            match order.partner_id {
                Some(partner_id) => {
                    if let Some(partner) = uow.partner(partner_id).await?
                        && let Some(token) = token_of(uow, partner.user_id).await?
                    {
                        notifications.push(Notification::for_order(
                            token,
                            NotificationKind::NewOrderDirect,
                            order.id,
                        ));
                    }
                }
                None => {
                    for partner in uow.active_partners().await? {
                        if let Some(token) = token_of(uow, partner.user_id).await? {
                            notifications.push(Notification::for_order(
                                token,
                                NotificationKind::NewOrderOpen,
                                order.id,
                            ));
                        }
                    }
                }
            }
        }
        OrderStatus::Cancelled => {
            if let Some(token) = token_of(uow, order.customer_id).await? {
                notifications.push(Notification::for_order(
                    token,
                    NotificationKind::OrderCancelled,
                    order.id,
                ));
            }
        }
        _ => {}
    }
    Ok(notifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::PartnerProfile;
    use crate::domain::ids::{PatientId, ServiceId, UserId};
    use crate::domain::money::Money;
    use crate::domain::order::{NewOrder, Schedule};
    use crate::domain::ports::Store;
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::infrastructure::notifier::RecordingNotifier;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn event(order_no: &str, status: &str, fraud: Option<&str>) -> GatewayEvent {
        GatewayEvent {
            order_no: order_no.to_string(),
            transaction_status: status.to_string(),
            fraud_status: fraud.map(str::to_string),
        }
    }

    async fn setup(
        direct: bool,
    ) -> (
        InMemoryStore,
        RecordingNotifier,
        PaymentReconciler,
        Vec<PartnerProfile>,
    ) {
        let store = InMemoryStore::new();
        let notifier = RecordingNotifier::new();
        let reconciler =
            PaymentReconciler::new(Arc::new(store.clone()), Arc::new(notifier.clone()));

        let mut uow = store.begin().await.unwrap();
        let first = uow.insert_partner(UserId(100), true).await.unwrap();
        let second = uow.insert_partner(UserId(200), true).await.unwrap();
        uow.insert_partner(UserId(300), false).await.unwrap();
        uow.insert_partner(UserId(400), true).await.unwrap();
        for user in [1, 100, 200, 300] {
            uow.set_device_token(UserId(user), format!("device-{}", user))
                .await
                .unwrap();
        }
        uow.insert_order(NewOrder {
            order_no: "INV-1".into(),
            customer_id: UserId(1),
            partner_id: direct.then_some(first.id),
            patient_id: PatientId(1),
            service_id: ServiceId(1),
            total_amount: Money::new(dec!(110)).unwrap(),
            schedule: Schedule::new(Utc::now(), 2).unwrap(),
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        (store, notifier, reconciler, vec![first, second])
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(target_status("capture", Some("accept")), OrderStatus::Paid);
        assert_eq!(
            target_status("capture", Some("challenge")),
            OrderStatus::PendingPayment
        );
        assert_eq!(target_status("settlement", None), OrderStatus::Paid);
        assert_eq!(target_status("deny", None), OrderStatus::Cancelled);
        assert_eq!(target_status("cancel", None), OrderStatus::Cancelled);
        assert_eq!(target_status("expire", None), OrderStatus::Cancelled);
        assert_eq!(target_status("pending", None), OrderStatus::PendingPayment);
        assert_eq!(target_status("refund", None), OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let (_store, notifier, reconciler, _) = setup(false).await;

        let first = reconciler
            .apply_gateway_event(&event("INV-1", "settlement", None))
            .await
            .unwrap();
        assert!(first.transitioned);
        assert_eq!(first.order.status, OrderStatus::Paid);
        let after_first = notifier.sent().await.len();

        let replay = reconciler
            .apply_gateway_event(&event("INV-1", "settlement", None))
            .await
            .unwrap();
        assert!(!replay.transitioned);
        assert_eq!(replay.order.status, OrderStatus::Paid);
        assert_eq!(notifier.sent().await.len(), after_first);
    }

    #[tokio::test]
    async fn test_open_booking_broadcasts_to_active_partners() {
        let (_store, notifier, reconciler, _) = setup(false).await;
        reconciler
            .apply_gateway_event(&event("INV-1", "capture", Some("accept")))
            .await
            .unwrap();

        let sent = notifier.sent().await;
        let customer: Vec<_> = sent
            .iter()
            .filter(|n| n.kind == NotificationKind::PaymentSuccess)
            .collect();
        assert_eq!(customer.len(), 1);
        assert_eq!(customer[0].device_token, "device-1");
        assert_eq!(customer[0].data["type"], "payment_success");

        // Partner 300 is inactive and partner 400 has no device.
        let mut broadcast: Vec<_> = sent
            .iter()
            .filter(|n| n.kind == NotificationKind::NewOrderOpen)
            .map(|n| n.device_token.as_str())
            .collect();
        broadcast.sort();
        assert_eq!(broadcast, vec!["device-100", "device-200"]);
    }

    #[tokio::test]
    async fn test_direct_booking_notifies_chosen_partner() {
        let (_store, notifier, reconciler, _) = setup(true).await;
        reconciler
            .apply_gateway_event(&event("INV-1", "settlement", None))
            .await
            .unwrap();

        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|n| n.kind == NotificationKind::NewOrderDirect
            && n.device_token == "device-100"));
        assert!(!sent.iter().any(|n| n.kind == NotificationKind::NewOrderOpen));
    }

    #[tokio::test]
    async fn test_late_events_do_not_regress_status() {
        let (store, notifier, reconciler, partners) = setup(false).await;
        reconciler
            .apply_gateway_event(&event("INV-1", "settlement", None))
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        let order = uow.order_by_no("INV-1").await.unwrap().unwrap();
        uow.compare_and_set_order(
            order.id,
            OrderStatus::Paid,
            OrderChange {
                status: OrderStatus::Assigned,
                partner_id: Some(partners[0].id),
            },
        )
        .await
        .unwrap();
        uow.commit().await.unwrap();
        drop(uow);
        let before = notifier.sent().await.len();

        for late in [
            event("INV-1", "pending", None),
            event("INV-1", "expire", None),
            event("INV-1", "settlement", None),
        ] {
            let outcome = reconciler.apply_gateway_event(&late).await.unwrap();
            assert!(!outcome.transitioned);
            assert_eq!(outcome.order.status, OrderStatus::Assigned);
        }
        assert_eq!(notifier.sent().await.len(), before);
    }

    #[tokio::test]
    async fn test_expiry_cancels_and_notifies_customer() {
        let (_store, notifier, reconciler, _) = setup(false).await;
        let outcome = reconciler
            .apply_gateway_event(&event("INV-1", "expire", None))
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Cancelled);

        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::OrderCancelled);
        assert_eq!(sent[0].device_token, "device-1");
    }

    #[tokio::test]
    async fn test_unknown_order_is_acknowledged() {
        let (_store, _notifier, reconciler, _) = setup(false).await;
        assert!(matches!(
            reconciler
                .apply_gateway_event(&event("INV-404", "settlement", None))
                .await,
            Err(BookingError::NotFound(_))
        ));
        let ack = reconciler
            .acknowledge(&event("INV-404", "settlement", None))
            .await;
        assert_eq!(ack.status, "ok");
    }

    #[tokio::test]
    async fn test_push_failure_does_not_undo_transition() {
        let (store, notifier, reconciler, _) = setup(false).await;
        notifier.mark_unreachable("device-1").await;

        let outcome = reconciler
            .apply_gateway_event(&event("INV-1", "settlement", None))
            .await
            .unwrap();
        assert!(outcome.transitioned);

        let mut uow = store.begin().await.unwrap();
        let order = uow.order_by_no("INV-1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }
}
