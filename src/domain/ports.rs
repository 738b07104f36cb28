//! Boundaries between the booking core and the outside world.
//!
//! The store is consumed through a [`UnitOfWork`]: every read and write made
//! through one unit is serialized against other units and becomes visible
//! only when [`UnitOfWork::commit`] succeeds. Dropping a unit without
//! committing discards its writes.

use super::catalog::{PartnerProfile, Service, check_listing};
use super::ids::{OrderId, PartnerId, ServiceId, TransactionId, UserId, WalletId};
use super::journal::{CareJournal, JournalPayload};
use super::money::{Balance, Money};
use super::notification::Notification;
use super::order::{NewOrder, Order, OrderStatus};
use super::wallet::{LedgerEntry, TransactionStatus, Wallet, WalletTransaction};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Fields of a service before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDraft {
    pub name: String,
    pub price: Money,
    pub admin_fee: Money,
}

impl ServiceDraft {
    pub fn validate(&self) -> Result<()> {
        check_listing(&self.name, self.price + self.admin_fee)
    }
}

#[async_trait]
pub trait CatalogRepository: Send {
    async fn service(&mut self, id: ServiceId) -> Result<Option<Service>>;
    async fn insert_service(&mut self, draft: ServiceDraft) -> Result<Service>;
    async fn update_service(&mut self, service: Service) -> Result<()>;
    /// Every service, ordered by id.
    async fn services(&mut self) -> Result<Vec<Service>>;
    /// Fails with `NotFound` if there is no such service.
    async fn delete_service(&mut self, id: ServiceId) -> Result<()>;

    async fn partner(&mut self, id: PartnerId) -> Result<Option<PartnerProfile>>;
    async fn partner_by_user(&mut self, user_id: UserId) -> Result<Option<PartnerProfile>>;
    /// Fails with `InvalidState` if the user already has a profile.
    async fn insert_partner(&mut self, user_id: UserId, is_active: bool)
    -> Result<PartnerProfile>;
    async fn update_partner(&mut self, profile: PartnerProfile) -> Result<()>;
    async fn active_partners(&mut self) -> Result<Vec<PartnerProfile>>;

    async fn device_token(&mut self, user_id: UserId) -> Result<Option<String>>;
    async fn set_device_token(&mut self, user_id: UserId, token: String) -> Result<()>;
}

/// The change a conditional order update applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderChange {
    pub status: OrderStatus,
    /// Assigns the partner when set; leaves the column alone otherwise.
    pub partner_id: Option<PartnerId>,
}

impl OrderChange {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status,
            partner_id: None,
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send {
    /// Fails with `InvalidState` if the order number is already taken.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;
    async fn order(&mut self, id: OrderId) -> Result<Option<Order>>;
    async fn order_by_no(&mut self, order_no: &str) -> Result<Option<Order>>;
    async fn orders_with_status(&mut self, status: OrderStatus) -> Result<Vec<Order>>;
    async fn orders_for_partner(
        &mut self,
        partner_id: PartnerId,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>>;
    async fn orders_for_customer(&mut self, customer_id: UserId) -> Result<Vec<Order>>;
    /// Whether any order, in any status, was placed for the service.
    async fn service_has_orders(&mut self, service_id: ServiceId) -> Result<bool>;

    /// `UPDATE orders SET .. WHERE id = ? AND status = ?`.
    ///
    /// Returns the updated row, or `None` when the order was not in
    /// `expected` and nothing changed.
    async fn compare_and_set_order(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        change: OrderChange,
    ) -> Result<Option<Order>>;
}

#[async_trait]
pub trait JournalRepository: Send {
    /// Fails with `InvalidState` if the order already has a journal.
    async fn insert_journal(
        &mut self,
        order_id: OrderId,
        payload: JournalPayload,
    ) -> Result<CareJournal>;
    async fn journal(&mut self, order_id: OrderId) -> Result<Option<CareJournal>>;
}

/// Balances and the append-only transaction log.
#[async_trait]
pub trait LedgerRepository: Send {
    async fn wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>>;
    async fn wallet_by_id(&mut self, id: WalletId) -> Result<Option<Wallet>>;
    async fn wallets(&mut self) -> Result<Vec<Wallet>>;
    /// Fails with `InvalidState` if the user already has a wallet.
    async fn create_wallet(&mut self, user_id: UserId) -> Result<Wallet>;

    async fn credit(&mut self, wallet_id: WalletId, amount: Money) -> Result<Balance>;
    /// Fails with `InsufficientFunds` and leaves the balance untouched.
    async fn debit(&mut self, wallet_id: WalletId, amount: Money) -> Result<Balance>;

    async fn append_transaction(&mut self, entry: LedgerEntry) -> Result<WalletTransaction>;
    async fn transaction(&mut self, id: TransactionId) -> Result<Option<WalletTransaction>>;
    async fn transactions(&mut self, wallet_id: WalletId) -> Result<Vec<WalletTransaction>>;
    async fn withdrawals(
        &mut self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<WalletTransaction>>;

    /// Moves a transaction out of `expected`. `None` when it was not in it.
    async fn compare_and_set_transaction(
        &mut self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Option<WalletTransaction>>;

    /// Zero for users that have no wallet yet.
    async fn balance(&mut self, user_id: UserId) -> Result<Balance> {
        Ok(self
            .wallet(user_id)
            .await?
            .map(|wallet| wallet.balance)
            .unwrap_or(Balance::ZERO))
    }
}

#[async_trait]
pub trait UnitOfWork:
    CatalogRepository + OrderRepository + JournalRepository + LedgerRepository + Send
{
    /// Publishes every staged write at once. The unit must not be used afterwards.
    async fn commit(&mut self) -> Result<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a unit of work, waiting for any unit currently in progress.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSessionRequest {
    pub order_no: String,
    pub gross_amount: Money,
    pub item_id: String,
    pub item_name: String,
    pub customer_id: UserId,
}

/// What the customer needs to pay: a token for embedded checkouts and a
/// redirect URL for the hosted page.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PaymentSession {
    pub token: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: PaymentSessionRequest) -> Result<PaymentSession>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<()>;
}

pub type StoreHandle = Arc<dyn Store>;
pub type GatewayHandle = Arc<dyn PaymentGateway>;
pub type NotifierHandle = Arc<dyn Notifier>;
