use crate::domain::wallet::Wallet;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct WalletRow {
    user: u64,
    wallet: u64,
    balance: String,
}

/// Writes wallet balances as CSV with a `user,wallet,balance` header.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_wallets(&mut self, wallets: impl IntoIterator<Item = Wallet>) -> Result<()> {
        for wallet in wallets {
            self.writer.serialize(WalletRow {
                user: wallet.user_id.value(),
                wallet: wallet.id.value(),
                balance: wallet.balance.to_string(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
