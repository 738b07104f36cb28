//! Wallet Service: balance mutations and the withdrawal lifecycle.

use super::notify::{deliver, token_of};
use crate::config::BookingPolicy;
use crate::domain::ids::{OrderId, TransactionId, UserId};
use crate::domain::money::{Balance, Money};
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::ports::{NotifierHandle, StoreHandle, UnitOfWork};
use crate::domain::wallet::{
    BankDetails, Decision, LedgerEntry, TransactionKind, TransactionStatus, Wallet,
    WalletTransaction, ledger_balance,
};
use crate::error::{BookingError, Result};
use serde::Serialize;
use tracing::info;

/// A wallet with its full history.
#[derive(Debug, Clone, Serialize)]
pub struct WalletOverview {
    pub wallet: Wallet,
    pub transactions: Vec<WalletTransaction>,
}

/// The stored balance next to the balance the ledger implies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerAudit {
    pub balance: Balance,
    pub ledger_balance: Balance,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_balance
    }
}

pub struct WalletService {
    store: StoreHandle,
    notifier: NotifierHandle,
    policy: BookingPolicy,
}

impl WalletService {
    pub fn new(store: StoreHandle, notifier: NotifierHandle, policy: BookingPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Balance> {
        let mut uow = self.store.begin().await?;
        uow.balance(user_id).await
    }

    /// Every wallet, ordered by id.
    pub async fn wallets(&self) -> Result<Vec<Wallet>> {
        let mut uow = self.store.begin().await?;
        let mut wallets = uow.wallets().await?;
        wallets.sort_by_key(|wallet| wallet.id);
        Ok(wallets)
    }

    /// Returns the user's wallet, creating an empty one on first access.
    pub async fn wallet_overview(&self, user_id: UserId) -> Result<WalletOverview> {
        let mut uow = self.store.begin().await?;
        let wallet = wallet_for(uow.as_mut(), user_id).await?;
        let transactions = uow.transactions(wallet.id).await?;
        uow.commit().await?;
        Ok(WalletOverview {
            wallet,
            transactions,
        })
    }

    /// Debits the wallet right away and records a pending withdrawal.
    ///
    /// The debited funds stay unavailable until an operator resolves the
    /// request; a rejection credits them back.
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Money,
        bank: BankDetails,
    ) -> Result<WalletTransaction> {
        if amount.value() < self.policy.minimum_withdrawal {
            return Err(BookingError::ValidationError(format!(
                "Minimum withdrawal is {}",
                self.policy.minimum_withdrawal
            )));
        }
        bank.validate()?;

        let mut uow = self.store.begin().await?;
        let wallet = wallet_for(uow.as_mut(), user_id).await?;
        let balance = uow.debit(wallet.id, amount).await?;
        let tx = uow
            .append_transaction(LedgerEntry::withdrawal(wallet.id, amount, bank))
            .await?;
        uow.commit().await?;

        info!(
            transaction_id = %tx.id,
            wallet_id = %wallet.id,
            amount = %amount,
            balance = %balance,
            "withdrawal requested"
        );
        Ok(tx)
    }

    /// Settles a pending withdrawal. A rejection refunds the wallet in the
    /// same unit of work as the status change.
    pub async fn resolve_withdrawal(
        &self,
        transaction_id: TransactionId,
        decision: Decision,
    ) -> Result<WalletTransaction> {
        let mut uow = self.store.begin().await?;
        let tx = uow
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Transaction {}", transaction_id)))?;
        if tx.kind != TransactionKind::Withdrawal {
            return Err(BookingError::InvalidState(format!(
                "transaction {} is not a withdrawal",
                transaction_id
            )));
        }

        let settled = uow
            .compare_and_set_transaction(
                transaction_id,
                TransactionStatus::Pending,
                decision.outcome(),
            )
            .await?
            .ok_or(BookingError::AlreadyProcessed(transaction_id.value()))?;

        if decision == Decision::Reject {
            uow.credit(settled.wallet_id, settled.amount).await?;
        }

        let owner = uow
            .wallet_by_id(settled.wallet_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Wallet {}", settled.wallet_id)))?;
        let token = token_of(uow.as_mut(), owner.user_id).await?;
        uow.commit().await?;
        drop(uow);

        info!(
            transaction_id = %settled.id,
            wallet_id = %settled.wallet_id,
            status = %settled.status,
            "withdrawal resolved"
        );

        if let Some(token) = token {
            let kind = match decision {
                Decision::Approve => NotificationKind::WithdrawalApproved,
                Decision::Reject => NotificationKind::WithdrawalRejected,
            };
            deliver(
                self.notifier.as_ref(),
                vec![Notification::for_transaction(token, kind, settled.id)],
            )
            .await;
        }
        Ok(settled)
    }

    /// Credits a partner's earnings for an order as a successful income row.
    pub async fn credit_earnings(
        &self,
        user_id: UserId,
        amount: Money,
        order_id: OrderId,
    ) -> Result<WalletTransaction> {
        let mut uow = self.store.begin().await?;
        let tx = post_earnings(uow.as_mut(), user_id, amount, order_id).await?;
        uow.commit().await?;
        Ok(tx)
    }

    /// Withdrawals for operators, optionally filtered by status. Newest first.
    pub async fn withdrawals(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<WalletTransaction>> {
        let mut uow = self.store.begin().await?;
        let mut rows = uow.withdrawals(status).await?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    /// Recomputes the balance from the ledger and compares it with the stored one.
    pub async fn audit(&self, user_id: UserId) -> Result<LedgerAudit> {
        let mut uow = self.store.begin().await?;
        let Some(wallet) = uow.wallet(user_id).await? else {
            return Ok(LedgerAudit {
                balance: Balance::ZERO,
                ledger_balance: Balance::ZERO,
            });
        };
        let transactions = uow.transactions(wallet.id).await?;
        Ok(LedgerAudit {
            balance: wallet.balance,
            ledger_balance: ledger_balance(&transactions),
        })
    }
}

/// The user's wallet, created with a zero balance inside `uow` if missing.
pub(crate) async fn wallet_for(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<Wallet> {
    match uow.wallet(user_id).await? {
        Some(wallet) => Ok(wallet),
        None => uow.create_wallet(user_id).await,
    }
}

/// Credits `amount` and appends the matching income row inside `uow`.
pub(crate) async fn post_earnings(
    uow: &mut dyn UnitOfWork,
    user_id: UserId,
    amount: Money,
    order_id: OrderId,
) -> Result<WalletTransaction> {
    let wallet = wallet_for(uow, user_id).await?;
    let balance = uow.credit(wallet.id, amount).await?;
    let tx = uow
        .append_transaction(LedgerEntry::income(wallet.id, order_id, amount))
        .await?;
    info!(
        transaction_id = %tx.id,
        wallet_id = %wallet.id,
        order_id = %order_id,
        amount = %amount,
        balance = %balance,
        "earnings credited"
    );
    Ok(tx)
}
