use super::ids::{OrderId, PartnerId, PatientId, ServiceId, UserId};
use super::money::Money;
use crate::error::BookingError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an order.
///
/// `PendingPayment -> Paid -> Assigned -> OnDuty -> Completed`, with
/// `Cancelled` reachable from `PendingPayment` and `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Assigned,
    OnDuty,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid)
                | (PendingPayment, Cancelled)
                | (Paid, Assigned)
                | (Paid, Cancelled)
                | (Assigned, OnDuty)
                | (Assigned, Completed)
                | (OnDuty, Completed)
        )
    }

    /// Statuses that occupy a partner's calendar.
    pub const BUSY: [OrderStatus; 2] = [OrderStatus::Assigned, OrderStatus::OnDuty];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
            Self::Assigned => "ASSIGNED",
            Self::OnDuty => "ON_DUTY",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The half-open interval `[start, end)` a visit occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Schedule {
    pub fn new(start: DateTime<Utc>, duration_hours: u32) -> Result<Self, BookingError> {
        if duration_hours == 0 {
            return Err(BookingError::ValidationError(
                "Duration must be at least one hour".to_string(),
            ));
        }
        let end = start
            .checked_add_signed(Duration::hours(i64::from(duration_hours)))
            .ok_or_else(|| BookingError::ValidationError("Schedule out of range".to_string()))?;
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &Schedule) -> bool {
        other.start < self.end && other.end > self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Correlates gateway webhooks with this order.
    pub order_no: String,
    pub customer_id: UserId,
    /// `None` means unassigned (open booking until claimed).
    pub partner_id: Option<PartnerId>,
    pub patient_id: PatientId,
    pub service_id: ServiceId,
    /// Service price plus admin fee, snapshotted at creation.
    pub total_amount: Money,
    pub status: OrderStatus,
    pub schedule: Schedule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_direct_booking(&self) -> bool {
        self.partner_id.is_some()
    }
}

/// An order row before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub order_no: String,
    pub customer_id: UserId,
    pub partner_id: Option<PartnerId>,
    pub patient_id: PatientId,
    pub service_id: ServiceId,
    pub total_amount: Money,
    pub schedule: Schedule,
}

impl NewOrder {
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            id,
            order_no: self.order_no,
            customer_id: self.customer_id,
            partner_id: self.partner_id,
            patient_id: self.patient_id,
            service_id: self.service_id,
            total_amount: self.total_amount,
            status: OrderStatus::PendingPayment,
            schedule: self.schedule,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The order number for `attempt` within the second of `now`:
/// `INV-<unix-timestamp>` first, then `INV-<unix-timestamp>-<attempt>`.
///
/// Callers pick the first attempt the store does not already hold.
pub fn order_number(now: DateTime<Utc>, attempt: u32) -> String {
    match attempt {
        0 => format!("INV-{}", now.timestamp()),
        n => format!("INV-{}-{}", now.timestamp(), n),
    }
}
