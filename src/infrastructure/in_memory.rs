use crate::domain::catalog::{PartnerProfile, Service};
use crate::domain::ids::{
    JournalId, OrderId, PartnerId, ServiceId, TransactionId, UserId, WalletId,
};
use crate::domain::journal::{CareJournal, JournalPayload};
use crate::domain::money::{Balance, Money};
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::ports::{
    CatalogRepository, JournalRepository, LedgerRepository, OrderChange, OrderRepository,
    ServiceDraft, Store, UnitOfWork,
};
use crate::domain::wallet::{LedgerEntry, TransactionKind, TransactionStatus, Wallet, WalletTransaction};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone, Copy)]
struct Sequences {
    service: u64,
    partner: u64,
    order: u64,
    journal: u64,
    wallet: u64,
    transaction: u64,
}

fn bump(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
struct Tables {
    services: BTreeMap<ServiceId, Service>,
    partners: BTreeMap<PartnerId, PartnerProfile>,
    device_tokens: BTreeMap<UserId, String>,
    orders: BTreeMap<OrderId, Order>,
    /// Keyed by order: one journal per order.
    journals: BTreeMap<OrderId, CareJournal>,
    wallets: BTreeMap<WalletId, Wallet>,
    transactions: BTreeMap<TransactionId, WalletTransaction>,
    sequences: Sequences,
}

type Rows<K, V> = fn(&mut Tables) -> &mut BTreeMap<K, V>;

impl Tables {
    fn services_mut(&mut self) -> &mut BTreeMap<ServiceId, Service> {
        &mut self.services
    }

    fn partners_mut(&mut self) -> &mut BTreeMap<PartnerId, PartnerProfile> {
        &mut self.partners
    }

    fn device_tokens_mut(&mut self) -> &mut BTreeMap<UserId, String> {
        &mut self.device_tokens
    }

    fn orders_mut(&mut self) -> &mut BTreeMap<OrderId, Order> {
        &mut self.orders
    }

    fn journals_mut(&mut self) -> &mut BTreeMap<OrderId, CareJournal> {
        &mut self.journals
    }

    fn wallets_mut(&mut self) -> &mut BTreeMap<WalletId, Wallet> {
        &mut self.wallets
    }

    fn transactions_mut(&mut self) -> &mut BTreeMap<TransactionId, WalletTransaction> {
        &mut self.transactions
    }
}

/// A thread-safe in-memory store.
///
/// Uses `Arc<Mutex<Tables>>`: a unit of work holds the owned guard for its
/// whole lifetime, which serializes every read-modify-write. Writes go
/// straight to the tables and leave an undo record behind; dropping the unit
/// without committing replays those records in reverse.
/// Ideal for testing or small datasets where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tables = self.tables.clone().lock_owned().await;
        let sequences = tables.sequences;
        Ok(Box::new(InMemoryUnitOfWork {
            tables,
            undo: Vec::new(),
            sequences,
            committed: false,
        }))
    }
}

type Undo = Box<dyn FnOnce(&mut Tables) + Send>;

pub struct InMemoryUnitOfWork {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
    /// Sequences as they were when the unit began.
    sequences: Sequences,
    committed: bool,
}

impl InMemoryUnitOfWork {
    /// Records the row currently under `key` so a rollback can put it back.
    fn remember<K, V>(&mut self, rows: Rows<K, V>, key: K)
    where
        K: Ord + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        let previous = rows(&mut *self.tables).get(&key).cloned();
        self.undo.push(Box::new(move |tables: &mut Tables| {
            let table = rows(tables);
            match previous {
                Some(row) => {
                    table.insert(key, row);
                }
                None => {
                    table.remove(&key);
                }
            }
        }));
    }

    fn write<K, V>(&mut self, rows: Rows<K, V>, key: K, value: V)
    where
        K: Ord + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        self.remember(rows, key.clone());
        rows(&mut *self.tables).insert(key, value);
    }

    fn wallet_mut(&mut self, id: WalletId) -> Result<&mut Wallet> {
        if !self.tables.wallets.contains_key(&id) {
            return Err(BookingError::NotFound(format!("Wallet {}", id)));
        }
        self.remember(Tables::wallets_mut, id);
        self.tables
            .wallets
            .get_mut(&id)
            .ok_or_else(|| BookingError::NotFound(format!("Wallet {}", id)))
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(undo) = self.undo.pop() {
            undo(&mut *self.tables);
        }
        self.tables.sequences = self.sequences;
    }
}

#[async_trait]
impl CatalogRepository for InMemoryUnitOfWork {
    async fn service(&mut self, id: ServiceId) -> Result<Option<Service>> {
        Ok(self.tables.services.get(&id).cloned())
    }

    async fn insert_service(&mut self, draft: ServiceDraft) -> Result<Service> {
        let id = ServiceId(bump(&mut self.tables.sequences.service));
        let service = Service {
            id,
            name: draft.name,
            price: draft.price,
            admin_fee: draft.admin_fee,
        };
        self.write(Tables::services_mut, id, service.clone());
        Ok(service)
    }

    async fn update_service(&mut self, service: Service) -> Result<()> {
        if !self.tables.services.contains_key(&service.id) {
            return Err(BookingError::NotFound(format!("Service {}", service.id)));
        }
        self.write(Tables::services_mut, service.id, service);
        Ok(())
    }

    async fn services(&mut self) -> Result<Vec<Service>> {
        Ok(self.tables.services.values().cloned().collect())
    }

    async fn delete_service(&mut self, id: ServiceId) -> Result<()> {
        if !self.tables.services.contains_key(&id) {
            return Err(BookingError::NotFound(format!("Service {}", id)));
        }
        self.remember(Tables::services_mut, id);
        self.tables.services.remove(&id);
        Ok(())
    }

    async fn partner(&mut self, id: PartnerId) -> Result<Option<PartnerProfile>> {
        Ok(self.tables.partners.get(&id).cloned())
    }

    async fn partner_by_user(&mut self, user_id: UserId) -> Result<Option<PartnerProfile>> {
        Ok(self
            .tables
            .partners
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn insert_partner(
        &mut self,
        user_id: UserId,
        is_active: bool,
    ) -> Result<PartnerProfile> {
        if self.partner_by_user(user_id).await?.is_some() {
            return Err(BookingError::InvalidState(format!(
                "user {} already has a partner profile",
                user_id
            )));
        }
        let id = PartnerId(bump(&mut self.tables.sequences.partner));
        let profile = PartnerProfile {
            id,
            user_id,
            is_active,
        };
        self.write(Tables::partners_mut, id, profile.clone());
        Ok(profile)
    }

    async fn update_partner(&mut self, profile: PartnerProfile) -> Result<()> {
        if !self.tables.partners.contains_key(&profile.id) {
            return Err(BookingError::NotFound(format!("Partner {}", profile.id)));
        }
        self.write(Tables::partners_mut, profile.id, profile);
        Ok(())
    }

    async fn active_partners(&mut self) -> Result<Vec<PartnerProfile>> {
        Ok(self
            .tables
            .partners
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }

    async fn device_token(&mut self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.tables.device_tokens.get(&user_id).cloned())
    }

    async fn set_device_token(&mut self, user_id: UserId, token: String) -> Result<()> {
        self.write(Tables::device_tokens_mut, user_id, token);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        if self.order_by_no(&order.order_no).await?.is_some() {
            return Err(BookingError::InvalidState(format!(
                "order number {} already exists",
                order.order_no
            )));
        }
        let id = OrderId(bump(&mut self.tables.sequences.order));
        let order = order.into_order(id, Utc::now());
        self.write(Tables::orders_mut, id, order.clone());
        Ok(order)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.orders.get(&id).cloned())
    }

    async fn order_by_no(&mut self, order_no: &str) -> Result<Option<Order>> {
        Ok(self
            .tables
            .orders
            .values()
            .find(|o| o.order_no == order_no)
            .cloned())
    }

    async fn orders_with_status(&mut self, status: OrderStatus) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }

    async fn orders_for_partner(
        &mut self,
        partner_id: PartnerId,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .orders
            .values()
            .filter(|o| o.partner_id == Some(partner_id))
            .filter(|o| statuses.is_empty() || statuses.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn orders_for_customer(&mut self, customer_id: UserId) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn service_has_orders(&mut self, service_id: ServiceId) -> Result<bool> {
        Ok(self
            .tables
            .orders
            .values()
            .any(|o| o.service_id == service_id))
    }

    async fn compare_and_set_order(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        change: OrderChange,
    ) -> Result<Option<Order>> {
        let Some(mut order) = self.tables.orders.get(&id).cloned() else {
            return Ok(None);
        };
        if order.status != expected {
            return Ok(None);
        }
        order.status = change.status;
        if let Some(partner_id) = change.partner_id {
            order.partner_id = Some(partner_id);
        }
        order.updated_at = Utc::now();
        self.write(Tables::orders_mut, id, order.clone());
        Ok(Some(order))
    }
}

#[async_trait]
impl JournalRepository for InMemoryUnitOfWork {
    async fn insert_journal(
        &mut self,
        order_id: OrderId,
        payload: JournalPayload,
    ) -> Result<CareJournal> {
        if self.tables.journals.contains_key(&order_id) {
            return Err(BookingError::InvalidState(format!(
                "order {} already has a care journal",
                order_id
            )));
        }
        let id = JournalId(bump(&mut self.tables.sequences.journal));
        let journal = CareJournal::from_payload(id, order_id, payload, Utc::now());
        self.write(Tables::journals_mut, order_id, journal.clone());
        Ok(journal)
    }

    async fn journal(&mut self, order_id: OrderId) -> Result<Option<CareJournal>> {
        Ok(self.tables.journals.get(&order_id).cloned())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryUnitOfWork {
    async fn wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        Ok(self
            .tables
            .wallets
            .values()
            .find(|w| w.user_id == user_id)
            .cloned())
    }

    async fn wallet_by_id(&mut self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.tables.wallets.get(&id).cloned())
    }

    async fn wallets(&mut self) -> Result<Vec<Wallet>> {
        Ok(self.tables.wallets.values().cloned().collect())
    }

    async fn create_wallet(&mut self, user_id: UserId) -> Result<Wallet> {
        if self.wallet(user_id).await?.is_some() {
            return Err(BookingError::InvalidState(format!(
                "user {} already has a wallet",
                user_id
            )));
        }
        let id = WalletId(bump(&mut self.tables.sequences.wallet));
        let wallet = Wallet::new(id, user_id, Utc::now());
        self.write(Tables::wallets_mut, id, wallet.clone());
        Ok(wallet)
    }

    async fn credit(&mut self, wallet_id: WalletId, amount: Money) -> Result<Balance> {
        let wallet = self.wallet_mut(wallet_id)?;
        Ok(wallet.credit(amount, Utc::now()))
    }

    async fn debit(&mut self, wallet_id: WalletId, amount: Money) -> Result<Balance> {
        let wallet = self.wallet_mut(wallet_id)?;
        wallet.debit(amount, Utc::now())
    }

    async fn append_transaction(&mut self, entry: LedgerEntry) -> Result<WalletTransaction> {
        if !self.tables.wallets.contains_key(&entry.wallet_id) {
            return Err(BookingError::NotFound(format!("Wallet {}", entry.wallet_id)));
        }
        let id = TransactionId(bump(&mut self.tables.sequences.transaction));
        let tx = entry.into_transaction(id, Utc::now());
        self.write(Tables::transactions_mut, id, tx.clone());
        Ok(tx)
    }

    async fn transaction(&mut self, id: TransactionId) -> Result<Option<WalletTransaction>> {
        Ok(self.tables.transactions.get(&id).cloned())
    }

    async fn transactions(&mut self, wallet_id: WalletId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .tables
            .transactions
            .values()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn withdrawals(
        &mut self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .tables
            .transactions
            .values()
            .filter(|tx| tx.kind == TransactionKind::Withdrawal)
            .filter(|tx| status.is_none_or(|s| tx.status == s))
            .cloned()
            .collect())
    }

    async fn compare_and_set_transaction(
        &mut self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Option<WalletTransaction>> {
        match self.tables.transactions.get(&id).cloned() {
            Some(mut tx) if tx.status == expected => {
                tx.status = next;
                self.write(Tables::transactions_mut, id, tx.clone());
                Ok(Some(tx))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(&mut self) -> Result<()> {
        self.undo.clear();
        self.committed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Schedule;
    use crate::domain::ids::PatientId;
    use rust_decimal_macros::dec;

    fn new_order(order_no: &str) -> NewOrder {
        NewOrder {
            order_no: order_no.to_string(),
            customer_id: UserId(1),
            partner_id: None,
            patient_id: PatientId(1),
            service_id: ServiceId(1),
            total_amount: Money::new(dec!(110)).unwrap(),
            schedule: Schedule::new(Utc::now(), 2).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = InMemoryStore::new();

        let mut uow = store.begin().await.unwrap();
        let wallet = uow.create_wallet(UserId(7)).await.unwrap();
        uow.credit(wallet.id, Money::new(dec!(85)).unwrap())
            .await
            .unwrap();
        uow.commit().await.unwrap();
        drop(uow);

        let mut uow = store.begin().await.unwrap();
        assert_eq!(
            uow.balance(UserId(7)).await.unwrap(),
            Balance::new(dec!(85))
        );
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let store = InMemoryStore::new();

        {
            let mut uow = store.begin().await.unwrap();
            uow.create_wallet(UserId(7)).await.unwrap();
            uow.insert_order(new_order("INV-1")).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        assert!(uow.wallet(UserId(7)).await.unwrap().is_none());
        assert!(uow.order_by_no("INV-1").await.unwrap().is_none());
        // Sequences roll back too.
        let order = uow.insert_order(new_order("INV-2")).await.unwrap();
        assert_eq!(order.id, OrderId(1));
    }

    #[tokio::test]
    async fn test_rollback_restores_updated_and_deleted_rows() {
        let store = InMemoryStore::new();
        let (service, wallet) = {
            let mut uow = store.begin().await.unwrap();
            let service = uow
                .insert_service(ServiceDraft {
                    name: "Home visit".into(),
                    price: Money::new(dec!(100)).unwrap(),
                    admin_fee: Money::new(dec!(10)).unwrap(),
                })
                .await
                .unwrap();
            let wallet = uow.create_wallet(UserId(7)).await.unwrap();
            uow.credit(wallet.id, Money::new(dec!(85)).unwrap())
                .await
                .unwrap();
            uow.commit().await.unwrap();
            (service, wallet)
        };

        {
            let mut uow = store.begin().await.unwrap();
            let mut renamed = service.clone();
            renamed.name = "Wound care".into();
            uow.update_service(renamed).await.unwrap();
            uow.delete_service(service.id).await.unwrap();
            uow.debit(wallet.id, Money::new(dec!(50)).unwrap())
                .await
                .unwrap();
            uow.credit(wallet.id, Money::new(dec!(5)).unwrap())
                .await
                .unwrap();
            uow.set_device_token(UserId(7), "device-7".into())
                .await
                .unwrap();
            assert!(uow.services().await.unwrap().is_empty());
        }

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.service(service.id).await.unwrap(), Some(service));
        assert_eq!(
            uow.balance(UserId(7)).await.unwrap(),
            Balance::new(dec!(85))
        );
        assert!(uow.device_token(UserId(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_debit_refuses_overdraft() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let wallet = uow.create_wallet(UserId(1)).await.unwrap();
        uow.credit(wallet.id, Money::new(dec!(10)).unwrap())
            .await
            .unwrap();

        let result = uow.debit(wallet.id, Money::new(dec!(11)).unwrap()).await;
        assert!(matches!(result, Err(BookingError::InsufficientFunds)));
        assert_eq!(
            uow.balance(UserId(1)).await.unwrap(),
            Balance::new(dec!(10))
        );
    }

    #[tokio::test]
    async fn test_compare_and_set_order_affects_one_row() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let order = uow.insert_order(new_order("INV-1")).await.unwrap();

        let paid = uow
            .compare_and_set_order(
                order.id,
                OrderStatus::PendingPayment,
                OrderChange::status(OrderStatus::Paid),
            )
            .await
            .unwrap();
        assert_eq!(paid.unwrap().status, OrderStatus::Paid);

        let again = uow
            .compare_and_set_order(
                order.id,
                OrderStatus::PendingPayment,
                OrderChange::status(OrderStatus::Paid),
            )
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_order(new_order("INV-1")).await.unwrap();
        assert!(matches!(
            uow.insert_order(new_order("INV-1")).await,
            Err(BookingError::InvalidState(_))
        ));

        uow.create_wallet(UserId(1)).await.unwrap();
        assert!(uow.create_wallet(UserId(1)).await.is_err());

        uow.insert_journal(OrderId(1), JournalPayload::default())
            .await
            .unwrap();
        assert!(
            uow.insert_journal(OrderId(1), JournalPayload::default())
                .await
                .is_err()
        );
    }
}
