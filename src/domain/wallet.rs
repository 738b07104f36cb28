use super::ids::{OrderId, TransactionId, UserId, WalletId};
use super::money::{Balance, Money};
use crate::error::BookingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user's balance. One per user, created lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Balance,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(id: WalletId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            balance: Balance::ZERO,
            updated_at: now,
        }
    }

    /// Adds funds to the balance.
    pub fn credit(&mut self, amount: Money, now: DateTime<Utc>) -> Balance {
        self.balance += amount.into();
        self.updated_at = now;
        self.balance
    }

    /// Removes funds if the balance covers them.
    pub fn debit(&mut self, amount: Money, now: DateTime<Utc>) -> Result<Balance, BookingError> {
        if self.balance.covers(amount) {
            self.balance -= amount.into();
            self.updated_at = now;
            Ok(self.balance)
        } else {
            Err(BookingError::InsufficientFunds)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Income,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        })
    }
}

/// Where a withdrawal should be paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank: String,
    pub account_number: String,
}

impl BankDetails {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.bank.trim().is_empty() || self.account_number.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "Bank name and account number are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// One ledger row.
///
/// Immutable except for the single `Pending -> Success | Failed` move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    /// Set for income, `None` for manual withdrawals.
    pub order_id: Option<OrderId>,
    pub amount: Money,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub bank: Option<BankDetails>,
    pub created_at: DateTime<Utc>,
}

/// A ledger row before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub wallet_id: WalletId,
    pub order_id: Option<OrderId>,
    pub amount: Money,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub bank: Option<BankDetails>,
}

impl LedgerEntry {
    pub fn income(wallet_id: WalletId, order_id: OrderId, amount: Money) -> Self {
        Self {
            wallet_id,
            order_id: Some(order_id),
            amount,
            kind: TransactionKind::Income,
            status: TransactionStatus::Success,
            bank: None,
        }
    }

    pub fn withdrawal(wallet_id: WalletId, amount: Money, bank: BankDetails) -> Self {
        Self {
            wallet_id,
            order_id: None,
            amount,
            kind: TransactionKind::Withdrawal,
            status: TransactionStatus::Pending,
            bank: Some(bank),
        }
    }

    pub fn into_transaction(self, id: TransactionId, now: DateTime<Utc>) -> WalletTransaction {
        WalletTransaction {
            id,
            wallet_id: self.wallet_id,
            order_id: self.order_id,
            amount: self.amount,
            kind: self.kind,
            status: self.status,
            bank: self.bank,
            created_at: now,
        }
    }
}

/// Operator decision on a pending withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn outcome(self) -> TransactionStatus {
        match self {
            Self::Approve => TransactionStatus::Success,
            Self::Reject => TransactionStatus::Failed,
        }
    }
}

/// The balance a ledger implies: successful income minus every withdrawal
/// that has not failed.
pub fn ledger_balance<'a>(transactions: impl IntoIterator<Item = &'a WalletTransaction>) -> Balance {
    transactions
        .into_iter()
        .fold(Balance::ZERO, |acc, tx| match (tx.kind, tx.status) {
            (TransactionKind::Income, TransactionStatus::Success) => acc + tx.amount.into(),
            (TransactionKind::Withdrawal, TransactionStatus::Failed) => acc,
            (TransactionKind::Withdrawal, _) => acc - tx.amount.into(),
            (TransactionKind::Income, _) => acc,
        })
}
