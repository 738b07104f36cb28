//! Order State Machine: creation, claiming, rejection and completion.

use super::notify::{deliver, token_of};
use super::payout::PayoutCalculator;
use super::wallet::post_earnings;
use crate::domain::catalog::PartnerProfile;
use crate::domain::ids::{OrderId, PartnerId, PatientId, ServiceId, UserId};
use crate::domain::journal::{CareJournal, JournalPayload};
use crate::domain::money::Money;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::order::{NewOrder, Order, OrderStatus, Schedule, order_number};
use crate::domain::ports::{
    GatewayHandle, NotifierHandle, OrderChange, PaymentSession, PaymentSessionRequest,
    StoreHandle, UnitOfWork,
};
use crate::domain::wallet::WalletTransaction;
use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What a customer submits to book a visit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewOrderRequest {
    pub patient_id: PatientId,
    pub service_id: ServiceId,
    pub schedule_start: DateTime<Utc>,
    pub duration_hours: u32,
    /// Books a specific partner directly. Open booking when absent.
    #[serde(default)]
    pub partner_id: Option<PartnerId>,
}

/// A persisted order and the payment session the customer must complete.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub payment: PaymentSession,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub journal: Option<CareJournal>,
}

/// Everything a completion produced.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReceipt {
    pub order: Order,
    pub journal: CareJournal,
    pub payout: Money,
    pub transaction: WalletTransaction,
}

pub struct OrderService {
    store: StoreHandle,
    gateway: GatewayHandle,
    notifier: NotifierHandle,
    payout: PayoutCalculator,
}

impl OrderService {
    pub fn new(
        store: StoreHandle,
        gateway: GatewayHandle,
        notifier: NotifierHandle,
        payout: PayoutCalculator,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            payout,
        }
    }

    /// Prices and persists a new order, then opens a payment session for it.
    ///
    /// The order is committed before the gateway is called. If the gateway
    /// fails the order stays in `PendingPayment` and
    /// [`OrderService::retry_payment_session`] can be used later.
    pub async fn create_order(
        &self,
        customer_id: UserId,
        request: NewOrderRequest,
    ) -> Result<PlacedOrder> {
        let schedule = Schedule::new(request.schedule_start, request.duration_hours)?;

        let mut uow = self.store.begin().await?;
        let service = uow
            .service(request.service_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Service {}", request.service_id)))?;
        if let Some(partner_id) = request.partner_id
            && uow.partner(partner_id).await?.is_none()
        {
            return Err(BookingError::NotFound(format!("Partner {}", partner_id)));
        }

        let order_no = free_order_number(uow.as_mut(), Utc::now()).await?;
        let order = uow
            .insert_order(NewOrder {
                order_no,
                customer_id,
                partner_id: request.partner_id,
                patient_id: request.patient_id,
                service_id: service.id,
                total_amount: service.total(),
                schedule,
            })
            .await?;
        uow.commit().await?;
        drop(uow);

        info!(
            order_id = %order.id,
            order_no = %order.order_no,
            total = %order.total_amount,
            direct = order.is_direct_booking(),
            "order created"
        );

        let payment = self
            .open_session(&order, format!("SVC-{}", service.id), service.name)
            .await?;
        Ok(PlacedOrder { order, payment })
    }

    /// Opens a new payment session for an order still awaiting payment.
    pub async fn retry_payment_session(
        &self,
        customer_id: UserId,
        order_id: OrderId,
    ) -> Result<PlacedOrder> {
        let mut uow = self.store.begin().await?;
        let order = load_order(uow.as_mut(), order_id).await?;
        if order.customer_id != customer_id {
            return Err(BookingError::Forbidden(format!(
                "order {} belongs to another customer",
                order_id
            )));
        }
        if order.status != OrderStatus::PendingPayment {
            return Err(BookingError::InvalidState(format!(
                "order {} is {}, not awaiting payment",
                order_id, order.status
            )));
        }
        let service = uow
            .service(order.service_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Service {}", order.service_id)))?;
        drop(uow);

        let payment = self
            .open_session(&order, format!("SVC-{}", service.id), service.name)
            .await?;
        Ok(PlacedOrder { order, payment })
    }

    async fn open_session(
        &self,
        order: &Order,
        item_id: String,
        item_name: String,
    ) -> Result<PaymentSession> {
        let request = PaymentSessionRequest {
            order_no: order.order_no.clone(),
            gross_amount: order.total_amount,
            item_id,
            item_name,
            customer_id: order.customer_id,
        };
        self.gateway.create_session(request).await.map_err(|err| {
            warn!(order_no = %order.order_no, error = %err, "payment session failed");
            BookingError::ExternalServiceFailure(format!(
                "payment for order {} could not be started, please retry",
                order.order_no
            ))
        })
    }

    /// Assigns a paid order to the calling partner.
    ///
    /// The status check, the schedule check and the conditional update run in
    /// one unit of work, so of two concurrent claims exactly one succeeds and
    /// the other sees `InvalidState`.
    pub async fn claim_order(&self, partner_user_id: UserId, order_id: OrderId) -> Result<Order> {
        let mut uow = self.store.begin().await?;
        let order = load_order(uow.as_mut(), order_id).await?;
        let profile = partner_profile(uow.as_mut(), partner_user_id).await?;

        // Before assignment a partner on the order can only be a direct booking.
        let awaiting_partner = matches!(
            order.status,
            OrderStatus::PendingPayment | OrderStatus::Paid
        );
        if awaiting_partner
            && order
                .partner_id
                .is_some_and(|assigned| assigned != profile.id)
        {
            return Err(BookingError::Forbidden(format!(
                "order {} is booked for another partner",
                order.order_no
            )));
        }
        if order.status != OrderStatus::Paid {
            return Err(BookingError::InvalidState(format!(
                "order {} is not paid or has already been taken",
                order.order_no
            )));
        }

        let busy = uow
            .orders_for_partner(profile.id, &OrderStatus::BUSY)
            .await?;
        if let Some(conflict) = busy
            .iter()
            .find(|other| other.id != order.id && other.schedule.overlaps(&order.schedule))
        {
            return Err(BookingError::ScheduleConflict(conflict.order_no.clone()));
        }

        let claimed = uow
            .compare_and_set_order(
                order.id,
                OrderStatus::Paid,
                OrderChange {
                    status: OrderStatus::Assigned,
                    partner_id: Some(profile.id),
                },
            )
            .await?
            .ok_or_else(|| {
                BookingError::InvalidState(format!("order {} has already been taken", order.order_no))
            })?;
        uow.commit().await?;

        info!(
            order_id = %claimed.id,
            order_no = %claimed.order_no,
            partner_id = %profile.id,
            status = %claimed.status,
            "order claimed"
        );
        Ok(claimed)
    }

    /// Lets the booked partner turn down a paid order. The partner stays on
    /// the order for audit.
    pub async fn reject_order(&self, partner_user_id: UserId, order_id: OrderId) -> Result<Order> {
        let mut uow = self.store.begin().await?;
        let order = load_order(uow.as_mut(), order_id).await?;
        let profile = partner_profile(uow.as_mut(), partner_user_id).await?;

        if order.partner_id != Some(profile.id) {
            return Err(BookingError::Forbidden(format!(
                "order {} is not assigned to you",
                order.order_no
            )));
        }
        let cancelled = uow
            .compare_and_set_order(
                order.id,
                OrderStatus::Paid,
                OrderChange::status(OrderStatus::Cancelled),
            )
            .await?
            .ok_or_else(|| {
                BookingError::InvalidState(format!(
                    "only paid orders can be rejected, order {} is {}",
                    order.order_no, order.status
                ))
            })?;
        let customer_token = token_of(uow.as_mut(), cancelled.customer_id).await?;
        uow.commit().await?;
        drop(uow);

        info!(
            order_id = %cancelled.id,
            order_no = %cancelled.order_no,
            partner_id = %profile.id,
            "order rejected by partner, refund pending"
        );

        if let Some(token) = customer_token {
            deliver(
                self.notifier.as_ref(),
                vec![Notification::for_order(
                    token,
                    NotificationKind::OrderCancelled,
                    cancelled.id,
                )],
            )
            .await;
        }
        Ok(cancelled)
    }

    /// Marks the assigned partner as on site.
    pub async fn start_visit(&self, partner_user_id: UserId, order_id: OrderId) -> Result<Order> {
        let mut uow = self.store.begin().await?;
        let order = load_order(uow.as_mut(), order_id).await?;
        let profile = partner_profile(uow.as_mut(), partner_user_id).await?;
        if order.partner_id != Some(profile.id) {
            return Err(BookingError::Forbidden(format!(
                "order {} is not assigned to you",
                order.order_no
            )));
        }

        let on_duty = uow
            .compare_and_set_order(
                order.id,
                OrderStatus::Assigned,
                OrderChange::status(OrderStatus::OnDuty),
            )
            .await?
            .ok_or_else(|| {
                BookingError::InvalidState(format!(
                    "order {} is {}, not assigned",
                    order.order_no, order.status
                ))
            })?;
        uow.commit().await?;

        info!(order_id = %on_duty.id, order_no = %on_duty.order_no, "visit started");
        Ok(on_duty)
    }

    /// Saves the care journal, completes the order and pays the partner.
    ///
    /// All of it commits together or not at all.
    pub async fn complete_order(
        &self,
        order_id: OrderId,
        payload: JournalPayload,
    ) -> Result<CompletionReceipt> {
        let mut uow = self.store.begin().await?;
        let order = load_order(uow.as_mut(), order_id).await?;
        if order.status == OrderStatus::Completed {
            return Err(BookingError::InvalidState(format!(
                "order {} has already been completed",
                order.order_no
            )));
        }
        if !order.status.can_transition_to(OrderStatus::Completed) {
            return Err(BookingError::InvalidState(format!(
                "order {} is {} and cannot be completed",
                order.order_no, order.status
            )));
        }

        let journal = uow.insert_journal(order.id, payload).await?;
        let completed = uow
            .compare_and_set_order(
                order.id,
                order.status,
                OrderChange::status(OrderStatus::Completed),
            )
            .await?
            .ok_or_else(|| {
                BookingError::InvalidState(format!("order {} changed concurrently", order.order_no))
            })?;

        let service = uow
            .service(completed.service_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Service {}", completed.service_id)))?;
        let payout = self.payout.compute_payout(&completed, &service);

        let partner_id = completed.partner_id.ok_or_else(|| {
            BookingError::InvalidState(format!("order {} has no partner", completed.order_no))
        })?;
        let partner = uow
            .partner(partner_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Partner {}", partner_id)))?;
        let transaction =
            post_earnings(uow.as_mut(), partner.user_id, payout, completed.id).await?;
        uow.commit().await?;

        info!(
            order_id = %completed.id,
            order_no = %completed.order_no,
            journal_id = %journal.id,
            transaction_id = %transaction.id,
            payout = %payout,
            "order completed"
        );
        Ok(CompletionReceipt {
            order: completed,
            journal,
            payout,
            transaction,
        })
    }

    /// Completion requested by a partner, who must be the one on the order.
    pub async fn complete_assigned(
        &self,
        partner_user_id: UserId,
        order_id: OrderId,
        payload: JournalPayload,
    ) -> Result<CompletionReceipt> {
        {
            let mut uow = self.store.begin().await?;
            let order = load_order(uow.as_mut(), order_id).await?;
            let profile = partner_profile(uow.as_mut(), partner_user_id).await?;
            if order.partner_id != Some(profile.id) {
                return Err(BookingError::Forbidden(format!(
                    "order {} is not assigned to you",
                    order.order_no
                )));
            }
        }
        self.complete_order(order_id, payload).await
    }

    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        let mut uow = self.store.begin().await?;
        load_order(uow.as_mut(), order_id).await
    }

    /// A customer's own order with its care journal, if any.
    pub async fn order_detail(&self, customer_id: UserId, order_id: OrderId) -> Result<OrderDetail> {
        let mut uow = self.store.begin().await?;
        let order = uow
            .order(order_id)
            .await?
            .filter(|order| order.customer_id == customer_id)
            .ok_or_else(|| BookingError::NotFound(format!("Order {}", order_id)))?;
        let journal = uow.journal(order.id).await?;
        Ok(OrderDetail { order, journal })
    }

    /// Paid open-booking orders nobody has claimed yet.
    pub async fn available_orders(&self) -> Result<Vec<Order>> {
        let mut uow = self.store.begin().await?;
        Ok(uow
            .orders_with_status(OrderStatus::Paid)
            .await?
            .into_iter()
            .filter(|order| order.partner_id.is_none())
            .collect())
    }

    /// The customer's order history, newest first.
    pub async fn customer_orders(&self, customer_id: UserId) -> Result<Vec<Order>> {
        let mut uow = self.store.begin().await?;
        let mut orders = uow.orders_for_customer(customer_id).await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    /// Every order the calling partner is or was on, newest first.
    pub async fn partner_jobs(&self, partner_user_id: UserId) -> Result<Vec<Order>> {
        let mut uow = self.store.begin().await?;
        let profile = partner_profile(uow.as_mut(), partner_user_id).await?;
        let mut jobs = uow.orders_for_partner(profile.id, &[]).await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }
}

/// The first order number for `now` that no stored order holds yet.
async fn free_order_number(uow: &mut dyn UnitOfWork, now: DateTime<Utc>) -> Result<String> {
    let mut attempt = 0;
    loop {
        let candidate = order_number(now, attempt);
        if uow.order_by_no(&candidate).await?.is_none() {
            return Ok(candidate);
        }
        attempt += 1;
    }
}

async fn load_order(uow: &mut dyn UnitOfWork, order_id: OrderId) -> Result<Order> {
    uow.order(order_id)
        .await?
        .ok_or_else(|| BookingError::NotFound(format!("Order {}", order_id)))
}

async fn partner_profile(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<PartnerProfile> {
    uow.partner_by_user(user_id)
        .await?
        .ok_or_else(|| BookingError::Forbidden("partner profile not found".to_string()))
}
