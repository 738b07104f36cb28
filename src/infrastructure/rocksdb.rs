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
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub const CF_SERVICES: &str = "services";
pub const CF_PARTNERS: &str = "partners";
pub const CF_DEVICE_TOKENS: &str = "device_tokens";
pub const CF_ORDERS: &str = "orders";
/// Order number -> order id.
pub const CF_ORDER_NUMBERS: &str = "order_numbers";
/// Keyed by order id: one journal per order.
pub const CF_JOURNALS: &str = "journals";
pub const CF_WALLETS: &str = "wallets";
/// User id -> wallet id.
pub const CF_WALLET_OWNERS: &str = "wallet_owners";
pub const CF_TRANSACTIONS: &str = "transactions";
/// Id sequences.
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 10] = [
    CF_SERVICES,
    CF_PARTNERS,
    CF_DEVICE_TOKENS,
    CF_ORDERS,
    CF_ORDER_NUMBERS,
    CF_JOURNALS,
    CF_WALLETS,
    CF_WALLET_OWNERS,
    CF_TRANSACTIONS,
    CF_META,
];

/// A persistent store implementation using RocksDB.
///
/// Each table lives in its own Column Family; values are JSON. Units of work
/// are serialized by a writer lock, stage their writes in memory and publish
/// them with a single atomic `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that every required column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }
}

#[async_trait]
impl Store for RocksDBStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(RocksDBUnitOfWork {
            db: self.db.clone(),
            _guard: guard,
            staged: BTreeMap::new(),
        }))
    }
}

pub struct RocksDBUnitOfWork {
    db: Arc<DB>,
    _guard: OwnedMutexGuard<()>,
    /// `None` marks a staged delete.
    staged: BTreeMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        BookingError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

impl RocksDBUnitOfWork {
    fn raw(&self, cf: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.staged.get(&(cf, key.to_vec())) {
            return Ok(value.clone());
        }
        let handle = self.db.cf_handle(cf).ok_or_else(|| {
            BookingError::internal(format!("{} column family not found", cf))
        })?;
        Ok(self.db.get_cf(&handle, key)?)
    }

    fn get<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        self.raw(cf, key)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn put<T: Serialize>(&mut self, cf: &'static str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.staged.insert((cf, key.to_vec()), Some(bytes));
        Ok(())
    }

    fn delete(&mut self, cf: &'static str, key: &[u8]) {
        self.staged.insert((cf, key.to_vec()), None);
    }

    /// Every committed row of a family with this unit's staged rows laid over it.
    fn scan<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>> {
        let handle = self.db.cf_handle(cf).ok_or_else(|| {
            BookingError::internal(format!("{} column family not found", cf))
        })?;

        let mut rows: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for item in self.db.iterator_cf(&handle, IteratorMode::Start) {
            let (key, value) = item?;
            rows.insert(key.to_vec(), value.to_vec());
        }
        for ((family, key), value) in &self.staged {
            if *family != cf {
                continue;
            }
            match value {
                Some(bytes) => rows.insert(key.clone(), bytes.clone()),
                None => rows.remove(key),
            };
        }

        rows.values().map(|bytes| decode(bytes)).collect()
    }

    fn next_id(&mut self, sequence: &'static str) -> Result<u64> {
        let current: u64 = self.get(CF_META, sequence.as_bytes())?.unwrap_or(0);
        let next = current + 1;
        self.put(CF_META, sequence.as_bytes(), &next)?;
        Ok(next)
    }

    fn user_key(user_id: UserId) -> [u8; 8] {
        user_id.to_key()
    }
}

#[async_trait]
impl CatalogRepository for RocksDBUnitOfWork {
    async fn service(&mut self, id: ServiceId) -> Result<Option<Service>> {
        self.get(CF_SERVICES, &id.to_key())
    }

    async fn insert_service(&mut self, draft: ServiceDraft) -> Result<Service> {
        let id = ServiceId(self.next_id("service")?);
        let service = Service {
            id,
            name: draft.name,
            price: draft.price,
            admin_fee: draft.admin_fee,
        };
        self.put(CF_SERVICES, &id.to_key(), &service)?;
        Ok(service)
    }

    async fn update_service(&mut self, service: Service) -> Result<()> {
        if self.service(service.id).await?.is_none() {
            return Err(BookingError::NotFound(format!("Service {}", service.id)));
        }
        self.put(CF_SERVICES, &service.id.to_key(), &service)
    }

    async fn services(&mut self) -> Result<Vec<Service>> {
        self.scan(CF_SERVICES)
    }

    async fn delete_service(&mut self, id: ServiceId) -> Result<()> {
        if self.service(id).await?.is_none() {
            return Err(BookingError::NotFound(format!("Service {}", id)));
        }
        self.delete(CF_SERVICES, &id.to_key());
        Ok(())
    }

    async fn partner(&mut self, id: PartnerId) -> Result<Option<PartnerProfile>> {
        self.get(CF_PARTNERS, &id.to_key())
    }

    async fn partner_by_user(&mut self, user_id: UserId) -> Result<Option<PartnerProfile>> {
        Ok(self
            .scan::<PartnerProfile>(CF_PARTNERS)?
            .into_iter()
            .find(|p| p.user_id == user_id))
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
        let id = PartnerId(self.next_id("partner")?);
        let profile = PartnerProfile {
            id,
            user_id,
            is_active,
        };
        self.put(CF_PARTNERS, &id.to_key(), &profile)?;
        Ok(profile)
    }

    async fn update_partner(&mut self, profile: PartnerProfile) -> Result<()> {
        if self.partner(profile.id).await?.is_none() {
            return Err(BookingError::NotFound(format!("Partner {}", profile.id)));
        }
        self.put(CF_PARTNERS, &profile.id.to_key(), &profile)
    }

    async fn active_partners(&mut self) -> Result<Vec<PartnerProfile>> {
        Ok(self
            .scan::<PartnerProfile>(CF_PARTNERS)?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }

    async fn device_token(&mut self, user_id: UserId) -> Result<Option<String>> {
        self.get(CF_DEVICE_TOKENS, &Self::user_key(user_id))
    }

    async fn set_device_token(&mut self, user_id: UserId, token: String) -> Result<()> {
        self.put(CF_DEVICE_TOKENS, &Self::user_key(user_id), &token)
    }
}

#[async_trait]
impl OrderRepository for RocksDBUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        if self.raw(CF_ORDER_NUMBERS, order.order_no.as_bytes())?.is_some() {
            return Err(BookingError::InvalidState(format!(
                "order number {} already exists",
                order.order_no
            )));
        }
        let id = OrderId(self.next_id("order")?);
        let order = order.into_order(id, Utc::now());
        self.put(CF_ORDERS, &id.to_key(), &order)?;
        self.put(CF_ORDER_NUMBERS, order.order_no.as_bytes(), &id)?;
        Ok(order)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.get(CF_ORDERS, &id.to_key())
    }

    async fn order_by_no(&mut self, order_no: &str) -> Result<Option<Order>> {
        match self.get::<OrderId>(CF_ORDER_NUMBERS, order_no.as_bytes())? {
            Some(id) => self.order(id).await,
            None => Ok(None),
        }
    }

    async fn orders_with_status(&mut self, status: OrderStatus) -> Result<Vec<Order>> {
        Ok(self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|o| o.status == status)
            .collect())
    }

    async fn orders_for_partner(
        &mut self,
        partner_id: PartnerId,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>> {
        Ok(self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|o| o.partner_id == Some(partner_id))
            .filter(|o| statuses.is_empty() || statuses.contains(&o.status))
            .collect())
    }

    async fn orders_for_customer(&mut self, customer_id: UserId) -> Result<Vec<Order>> {
        Ok(self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|o| o.customer_id == customer_id)
            .collect())
    }

    async fn service_has_orders(&mut self, service_id: ServiceId) -> Result<bool> {
        Ok(self
            .scan::<Order>(CF_ORDERS)?
            .iter()
            .any(|o| o.service_id == service_id))
    }

    async fn compare_and_set_order(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        change: OrderChange,
    ) -> Result<Option<Order>> {
        let Some(mut order) = self.order(id).await? else {
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
        self.put(CF_ORDERS, &id.to_key(), &order)?;
        Ok(Some(order))
    }
}

#[async_trait]
impl JournalRepository for RocksDBUnitOfWork {
    async fn insert_journal(
        &mut self,
        order_id: OrderId,
        payload: JournalPayload,
    ) -> Result<CareJournal> {
        if self.raw(CF_JOURNALS, &order_id.to_key())?.is_some() {
            return Err(BookingError::InvalidState(format!(
                "order {} already has a care journal",
                order_id
            )));
        }
        let id = JournalId(self.next_id("journal")?);
        let journal = CareJournal::from_payload(id, order_id, payload, Utc::now());
        self.put(CF_JOURNALS, &order_id.to_key(), &journal)?;
        Ok(journal)
    }

    async fn journal(&mut self, order_id: OrderId) -> Result<Option<CareJournal>> {
        self.get(CF_JOURNALS, &order_id.to_key())
    }
}

#[async_trait]
impl LedgerRepository for RocksDBUnitOfWork {
    async fn wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        match self.get::<WalletId>(CF_WALLET_OWNERS, &Self::user_key(user_id))? {
            Some(id) => self.wallet_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn wallet_by_id(&mut self, id: WalletId) -> Result<Option<Wallet>> {
        self.get(CF_WALLETS, &id.to_key())
    }

    async fn wallets(&mut self) -> Result<Vec<Wallet>> {
        self.scan(CF_WALLETS)
    }

    async fn create_wallet(&mut self, user_id: UserId) -> Result<Wallet> {
        if self.raw(CF_WALLET_OWNERS, &Self::user_key(user_id))?.is_some() {
            return Err(BookingError::InvalidState(format!(
                "user {} already has a wallet",
                user_id
            )));
        }
        let id = WalletId(self.next_id("wallet")?);
        let wallet = Wallet::new(id, user_id, Utc::now());
        self.put(CF_WALLETS, &id.to_key(), &wallet)?;
        self.put(CF_WALLET_OWNERS, &Self::user_key(user_id), &id)?;
        Ok(wallet)
    }

    async fn credit(&mut self, wallet_id: WalletId, amount: Money) -> Result<Balance> {
        let mut wallet = self
            .wallet_by_id(wallet_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Wallet {}", wallet_id)))?;
        let balance = wallet.credit(amount, Utc::now());
        self.put(CF_WALLETS, &wallet_id.to_key(), &wallet)?;
        Ok(balance)
    }

    async fn debit(&mut self, wallet_id: WalletId, amount: Money) -> Result<Balance> {
        let mut wallet = self
            .wallet_by_id(wallet_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Wallet {}", wallet_id)))?;
        let balance = wallet.debit(amount, Utc::now())?;
        self.put(CF_WALLETS, &wallet_id.to_key(), &wallet)?;
        Ok(balance)
    }

    async fn append_transaction(&mut self, entry: LedgerEntry) -> Result<WalletTransaction> {
        if self.wallet_by_id(entry.wallet_id).await?.is_none() {
            return Err(BookingError::NotFound(format!("Wallet {}", entry.wallet_id)));
        }
        let id = TransactionId(self.next_id("transaction")?);
        let tx = entry.into_transaction(id, Utc::now());
        self.put(CF_TRANSACTIONS, &id.to_key(), &tx)?;
        Ok(tx)
    }

    async fn transaction(&mut self, id: TransactionId) -> Result<Option<WalletTransaction>> {
        self.get(CF_TRANSACTIONS, &id.to_key())
    }

    async fn transactions(&mut self, wallet_id: WalletId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .scan::<WalletTransaction>(CF_TRANSACTIONS)?
            .into_iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .collect())
    }

    async fn withdrawals(
        &mut self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .scan::<WalletTransaction>(CF_TRANSACTIONS)?
            .into_iter()
            .filter(|tx| tx.kind == TransactionKind::Withdrawal)
            .filter(|tx| status.is_none_or(|s| tx.status == s))
            .collect())
    }

    async fn compare_and_set_transaction(
        &mut self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Option<WalletTransaction>> {
        match self.transaction(id).await? {
            Some(mut tx) if tx.status == expected => {
                tx.status = next;
                self.put(CF_TRANSACTIONS, &id.to_key(), &tx)?;
                Ok(Some(tx))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl UnitOfWork for RocksDBUnitOfWork {
    async fn commit(&mut self) -> Result<()> {
        let mut batch = WriteBatch::default();
        for ((cf, key), value) in std::mem::take(&mut self.staged) {
            let handle = self.db.cf_handle(cf).ok_or_else(|| {
                BookingError::internal(format!("{} column family not found", cf))
            })?;
            match value {
                Some(bytes) => batch.put_cf(&handle, key, bytes),
                None => batch.delete_cf(&handle, key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}
