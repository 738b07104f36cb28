use super::ids::{OrderId, TransactionId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Why a push was sent. Clients switch on the `type` data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentSuccess,
    NewOrderDirect,
    NewOrderOpen,
    OrderCancelled,
    WithdrawalApproved,
    WithdrawalRejected,
}

impl NotificationKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::PaymentSuccess => "payment_success",
            Self::NewOrderDirect => "new_order_direct",
            Self::NewOrderOpen => "new_order_open",
            Self::OrderCancelled => "order_cancelled",
            Self::WithdrawalApproved => "withdrawal_approved",
            Self::WithdrawalRejected => "withdrawal_rejected",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::PaymentSuccess => "Payment received",
            Self::NewOrderDirect => "New order for you",
            Self::NewOrderOpen => "New job nearby",
            Self::OrderCancelled => "Order cancelled",
            Self::WithdrawalApproved => "Withdrawal approved",
            Self::WithdrawalRejected => "Withdrawal rejected",
        }
    }
}

/// A push message addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub device_token: String,
    pub kind: NotificationKind,
    pub title: String,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn for_order(device_token: String, kind: NotificationKind, order_id: OrderId) -> Self {
        Self::build(device_token, kind, "order_id", order_id.to_string())
    }

    pub fn for_transaction(
        device_token: String,
        kind: NotificationKind,
        transaction_id: TransactionId,
    ) -> Self {
        Self::build(device_token, kind, "transaction_id", transaction_id.to_string())
    }

    fn build(device_token: String, kind: NotificationKind, key: &str, id: String) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), id);
        data.insert("type".to_string(), kind.as_str().to_string());
        Self {
            device_token,
            kind,
            title: kind.title().to_string(),
            data,
        }
    }
}
