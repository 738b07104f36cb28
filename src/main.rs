use clap::Parser;
use homecare_ledger::config::BookingPolicy;
use homecare_ledger::domain::ports::StoreHandle;
use homecare_ledger::infrastructure::gateway::SandboxGateway;
use homecare_ledger::infrastructure::in_memory::InMemoryStore;
use homecare_ledger::infrastructure::notifier::LogNotifier;
use homecare_ledger::interfaces::commands::{CommandDispatcher, CommandReader};
use homecare_ledger::interfaces::csv::wallet_writer::WalletWriter;
use homecare_ledger::interfaces::response::ApiResponse;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script, one JSON request per line. `-` reads from stdin.
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Smallest amount a partner may withdraw
    #[arg(long, env = "HOMECARE_MINIMUM_WITHDRAWAL", default_value_t = BookingPolicy::DEFAULT_MINIMUM_WITHDRAWAL)]
    minimum_withdrawal: Decimal,

    /// Partner's share of the order total after the admin fee
    #[arg(long, env = "HOMECARE_PARTNER_SHARE", default_value_t = BookingPolicy::DEFAULT_PARTNER_SHARE)]
    partner_share: Decimal,

    /// Base URL used in payment redirect links
    #[arg(long, default_value = "https://sandbox.payments.local")]
    gateway_base_url: String,
}

fn open_store(db_path: Option<PathBuf>) -> Result<StoreHandle> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            use homecare_ledger::infrastructure::rocksdb::RocksDBStore;
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => {
            tracing::warn!(
                path = %path.display(),
                "built without storage-rocksdb, falling back to in-memory storage"
            );
            Ok(Arc::new(InMemoryStore::new()))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let policy = BookingPolicy::new(cli.minimum_withdrawal, cli.partner_share).into_diagnostic()?;
    let store = open_store(cli.db_path)?;

    let dispatcher = CommandDispatcher::new(
        store,
        Arc::new(SandboxGateway::new(cli.gateway_base_url)),
        Arc::new(LogNotifier),
        policy,
    );

    let source: Box<dyn BufRead> = if cli.input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(&cli.input).into_diagnostic()?))
    };
    let reader = CommandReader::new(source);
    let stdout = io::stdout();

    for command in reader.commands() {
        let response = match command {
            Ok(envelope) => dispatcher.dispatch(envelope).await,
            Err(err) => ApiResponse::failure(&err),
        };
        let line = serde_json::to_string(&response).into_diagnostic()?;
        writeln!(stdout.lock(), "{}", line).into_diagnostic()?;
    }

    // Final balances
    let wallets = dispatcher.wallets().wallets().await.into_diagnostic()?;
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(wallets).into_diagnostic()?;

    Ok(())
}
