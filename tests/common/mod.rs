#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use homecare_ledger::application::catalog::CatalogService;
use homecare_ledger::application::orders::{NewOrderRequest, OrderService, PlacedOrder};
use homecare_ledger::application::payout::PayoutCalculator;
use homecare_ledger::application::reconciliation::{GatewayEvent, PaymentReconciler};
use homecare_ledger::application::wallet::WalletService;
use homecare_ledger::config::BookingPolicy;
use homecare_ledger::domain::catalog::{PartnerProfile, Service};
use homecare_ledger::domain::ids::{PartnerId, PatientId, UserId};
use homecare_ledger::domain::money::Money;
use homecare_ledger::domain::ports::ServiceDraft;
use homecare_ledger::infrastructure::gateway::SandboxGateway;
use homecare_ledger::infrastructure::in_memory::InMemoryStore;
use homecare_ledger::infrastructure::notifier::RecordingNotifier;
use rust_decimal::Decimal;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub const CUSTOMER: UserId = UserId(1);
pub const ADMIN: UserId = UserId(99);

/// Every service wired to one in-memory store.
pub struct Platform {
    pub store: InMemoryStore,
    pub notifier: RecordingNotifier,
    pub gateway: Arc<SandboxGateway>,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub reconciler: PaymentReconciler,
    pub wallets: WalletService,
}

impl Platform {
    pub fn new() -> Self {
        Self::with_policy(BookingPolicy::default())
    }

    pub fn with_policy(policy: BookingPolicy) -> Self {
        let store = InMemoryStore::new();
        let notifier = RecordingNotifier::new();
        let gateway = Arc::new(SandboxGateway::default());
        Self {
            catalog: CatalogService::new(Arc::new(store.clone())),
            orders: OrderService::new(
                Arc::new(store.clone()),
                gateway.clone(),
                Arc::new(notifier.clone()),
                PayoutCalculator::new(policy.partner_share),
            ),
            reconciler: PaymentReconciler::new(
                Arc::new(store.clone()),
                Arc::new(notifier.clone()),
            ),
            wallets: WalletService::new(
                Arc::new(store.clone()),
                Arc::new(notifier.clone()),
                policy,
            ),
            store,
            notifier,
            gateway,
        }
    }

    pub async fn service(&self, price: Decimal, admin_fee: Decimal) -> Service {
        self.catalog
            .register_service(ServiceDraft {
                name: "Home nursing visit".to_string(),
                price: Money::new(price).unwrap(),
                admin_fee: Money::new(admin_fee).unwrap(),
            })
            .await
            .unwrap()
    }

    pub async fn partner(&self, user_id: UserId) -> PartnerProfile {
        self.catalog.register_partner(user_id).await.unwrap()
    }

    pub async fn book(&self, service: &Service, hour: u32, hours: u32) -> PlacedOrder {
        self.book_for(service, hour, hours, None).await
    }

    pub async fn book_for(
        &self,
        service: &Service,
        hour: u32,
        hours: u32,
        partner: Option<PartnerId>,
    ) -> PlacedOrder {
        self.orders
            .create_order(
                CUSTOMER,
                NewOrderRequest {
                    patient_id: PatientId(1),
                    service_id: service.id,
                    schedule_start: at(hour),
                    duration_hours: hours,
                    partner_id: partner,
                },
            )
            .await
            .unwrap()
    }

    /// Delivers a settlement callback for the order.
    pub async fn settle(&self, order_no: &str) {
        self.reconciler
            .apply_gateway_event(&settlement(order_no))
            .await
            .unwrap();
    }
}

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 20, hour, 0, 0).unwrap()
}

pub fn settlement(order_no: &str) -> GatewayEvent {
    GatewayEvent {
        order_no: order_no.to_string(),
        transaction_status: "settlement".to_string(),
        fraud_status: None,
    }
}

/// Writes a JSON-lines command script.
pub fn write_script(path: &Path, lines: &[&str]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

/// A CLI process fed one command at a time over stdin.
pub struct Session {
    child: std::process::Child,
    stdin: Option<std::process::ChildStdin>,
    stdout: std::io::BufReader<std::process::ChildStdout>,
}

impl Session {
    pub fn start(extra_args: &[&str]) -> Self {
        use std::process::{Command, Stdio};
        let mut child = Command::new(assert_cmd::cargo_bin!("homecare-ledger"))
            .arg("-")
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to start the CLI");
        let stdin = child.stdin.take();
        let stdout = std::io::BufReader::new(child.stdout.take().unwrap());
        Self {
            child,
            stdin,
            stdout,
        }
    }

    /// Sends one command and returns the parsed response line.
    pub fn send(&mut self, line: &str) -> serde_json::Value {
        use std::io::BufRead;
        let stdin = self.stdin.as_mut().unwrap();
        writeln!(stdin, "{}", line).unwrap();
        stdin.flush().unwrap();

        let mut response = String::new();
        self.stdout.read_line(&mut response).unwrap();
        serde_json::from_str(&response).unwrap()
    }

    /// Closes stdin and returns everything printed afterwards.
    pub fn finish(mut self) -> String {
        use std::io::Read;
        drop(self.stdin.take());
        let mut rest = String::new();
        self.stdout.read_to_string(&mut rest).unwrap();
        assert!(self.child.wait().unwrap().success());
        rest
    }
}
