//! JSON-lines command scripts.
//!
//! Each non-empty line is one request: an optional verified `caller` and an
//! `op` naming the operation, with the operation's fields alongside.
//!
//! ```text
//! {"caller":{"user_id":1,"role":"customer"},"op":"create_order","patient_id":1,...}
//! {"op":"gateway_event","order_no":"INV-1","transaction_status":"settlement"}
//! ```

use super::response::ApiResponse;
use crate::application::catalog::CatalogService;
use crate::application::orders::{NewOrderRequest, OrderService};
use crate::application::payout::PayoutCalculator;
use crate::application::reconciliation::{GatewayEvent, PaymentReconciler};
use crate::application::wallet::WalletService;
use crate::config::BookingPolicy;
use crate::domain::identity::{Caller, Role};
use crate::domain::ids::{OrderId, ServiceId, TransactionId, UserId};
use crate::domain::journal::JournalPayload;
use crate::domain::money::Money;
use crate::domain::ports::{GatewayHandle, NotifierHandle, ServiceDraft, StoreHandle};
use crate::domain::wallet::{BankDetails, Decision, TransactionStatus};
use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::BufRead;

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub caller: Option<Caller>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterService {
        name: String,
        price: Money,
        admin_fee: Money,
    },
    UpdateService {
        service_id: ServiceId,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        price: Option<Money>,
        #[serde(default)]
        admin_fee: Option<Money>,
    },
    DeleteService {
        service_id: ServiceId,
    },
    Services,
    RegisterPartner {
        user_id: UserId,
    },
    ToggleAvailability,
    RegisterDevice {
        token: String,
    },
    CreateOrder(NewOrderRequest),
    RetryPayment {
        order_id: OrderId,
    },
    OrderDetail {
        order_id: OrderId,
    },
    MyOrders,
    AvailableOrders,
    PartnerJobs,
    ClaimOrder {
        order_id: OrderId,
    },
    RejectOrder {
        order_id: OrderId,
    },
    StartVisit {
        order_id: OrderId,
    },
    CompleteOrder {
        order_id: OrderId,
        #[serde(default)]
        journal: JournalPayload,
    },
    /// Gateway callbacks are not signed in by a user.
    GatewayEvent(GatewayEvent),
    Wallet,
    RequestWithdrawal {
        amount: Money,
        bank: BankDetails,
    },
    ResolveWithdrawal {
        transaction_id: TransactionId,
        decision: Decision,
    },
    Withdrawals {
        #[serde(default)]
        status: Option<TransactionStatus>,
    },
    Audit {
        user_id: UserId,
    },
}

pub fn parse_envelope(line: &str) -> Result<Envelope> {
    serde_json::from_str(line)
        .map_err(|err| BookingError::ValidationError(format!("malformed command: {}", err)))
}

/// Reads commands from a script, one JSON object per line.
///
/// Blank lines and lines starting with `#` are skipped.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses the script; a malformed line yields an error and the
    /// iterator carries on with the next one.
    pub fn commands(self) -> impl Iterator<Item = Result<Envelope>> {
        self.source.lines().filter_map(|line| match line {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some(parse_envelope(line))
                }
            }
            Err(err) => Some(Err(BookingError::from(err))),
        })
    }
}

/// Routes commands to the application services after checking the caller's role.
pub struct CommandDispatcher {
    catalog: CatalogService,
    orders: OrderService,
    reconciler: PaymentReconciler,
    wallets: WalletService,
}

impl CommandDispatcher {
    pub fn new(
        store: StoreHandle,
        gateway: GatewayHandle,
        notifier: NotifierHandle,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            orders: OrderService::new(
                store.clone(),
                gateway,
                notifier.clone(),
                PayoutCalculator::new(policy.partner_share),
            ),
            reconciler: PaymentReconciler::new(store.clone(), notifier.clone()),
            wallets: WalletService::new(store, notifier, policy),
        }
    }

    pub fn wallets(&self) -> &WalletService {
        &self.wallets
    }

    pub async fn dispatch(&self, envelope: Envelope) -> ApiResponse<Value> {
        match self.execute(envelope).await {
            Ok((message, data)) => ApiResponse::ok(message, data),
            Err(err) => ApiResponse::failure(&err),
        }
    }

    async fn execute(&self, envelope: Envelope) -> Result<(&'static str, Value)> {
        let Envelope { caller, command } = envelope;
        match command {
            Command::GatewayEvent(event) => {
                reply("Notification received", self.reconciler.acknowledge(&event).await)
            }

            Command::RegisterService {
                name,
                price,
                admin_fee,
            } => {
                acting_as(caller, Role::Admin)?;
                let draft = ServiceDraft {
                    name,
                    price,
                    admin_fee,
                };
                reply("Service registered", self.catalog.register_service(draft).await?)
            }
            Command::UpdateService {
                service_id,
                name,
                price,
                admin_fee,
            } => {
                acting_as(caller, Role::Admin)?;
                let service = self
                    .catalog
                    .update_service(service_id, name, price, admin_fee)
                    .await?;
                reply("Service updated", service)
            }
            Command::DeleteService { service_id } => {
                acting_as(caller, Role::Admin)?;
                self.catalog.delete_service(service_id).await?;
                reply("Service deleted", Value::Null)
            }
            Command::Services => {
                signed_in(caller)?;
                reply("Services", self.catalog.services().await?)
            }
            Command::RegisterPartner { user_id } => {
                acting_as(caller, Role::Admin)?;
                reply("Partner registered", self.catalog.register_partner(user_id).await?)
            }
            Command::ToggleAvailability => {
                let caller = acting_as(caller, Role::Partner)?;
                let profile = self.catalog.toggle_availability(caller.user_id).await?;
                reply("Availability updated", profile)
            }
            Command::RegisterDevice { token } => {
                let caller = signed_in(caller)?;
                self.catalog.register_device(caller.user_id, token).await?;
                reply("Device registered", Value::Null)
            }

            Command::CreateOrder(request) => {
                let caller = acting_as(caller, Role::Customer)?;
                reply(
                    "Order created",
                    self.orders.create_order(caller.user_id, request).await?,
                )
            }
            Command::RetryPayment { order_id } => {
                let caller = acting_as(caller, Role::Customer)?;
                let placed = self
                    .orders
                    .retry_payment_session(caller.user_id, order_id)
                    .await?;
                reply("Payment session created", placed)
            }
            Command::OrderDetail { order_id } => {
                let caller = acting_as(caller, Role::Customer)?;
                reply(
                    "Order detail",
                    self.orders.order_detail(caller.user_id, order_id).await?,
                )
            }
            Command::MyOrders => {
                let caller = acting_as(caller, Role::Customer)?;
                reply("Order history", self.orders.customer_orders(caller.user_id).await?)
            }
            Command::AvailableOrders => {
                acting_as(caller, Role::Partner)?;
                reply("Available orders", self.orders.available_orders().await?)
            }
            Command::PartnerJobs => {
                let caller = acting_as(caller, Role::Partner)?;
                reply("Jobs", self.orders.partner_jobs(caller.user_id).await?)
            }
            Command::ClaimOrder { order_id } => {
                let caller = acting_as(caller, Role::Partner)?;
                reply(
                    "Order claimed",
                    self.orders.claim_order(caller.user_id, order_id).await?,
                )
            }
            Command::RejectOrder { order_id } => {
                let caller = acting_as(caller, Role::Partner)?;
                reply(
                    "Order rejected",
                    self.orders.reject_order(caller.user_id, order_id).await?,
                )
            }
            Command::StartVisit { order_id } => {
                let caller = acting_as(caller, Role::Partner)?;
                reply(
                    "Visit started",
                    self.orders.start_visit(caller.user_id, order_id).await?,
                )
            }
            Command::CompleteOrder { order_id, journal } => {
                let caller = acting_as(caller, Role::Partner)?;
                let receipt = self
                    .orders
                    .complete_assigned(caller.user_id, order_id, journal)
                    .await?;
                reply("Order completed", receipt)
            }

            Command::Wallet => {
                let caller = signed_in(caller)?;
                reply("Wallet", self.wallets.wallet_overview(caller.user_id).await?)
            }
            Command::RequestWithdrawal { amount, bank } => {
                let caller = acting_as(caller, Role::Partner)?;
                let tx = self
                    .wallets
                    .request_withdrawal(caller.user_id, amount, bank)
                    .await?;
                reply("Withdrawal requested", tx)
            }
            Command::ResolveWithdrawal {
                transaction_id,
                decision,
            } => {
                acting_as(caller, Role::Admin)?;
                let tx = self
                    .wallets
                    .resolve_withdrawal(transaction_id, decision)
                    .await?;
                reply("Withdrawal resolved", tx)
            }
            Command::Withdrawals { status } => {
                acting_as(caller, Role::Admin)?;
                reply("Withdrawals", self.wallets.withdrawals(status).await?)
            }
            Command::Audit { user_id } => {
                acting_as(caller, Role::Admin)?;
                reply("Ledger audit", self.wallets.audit(user_id).await?)
            }
        }
    }
}

fn reply<T: Serialize>(message: &'static str, data: T) -> Result<(&'static str, Value)> {
    Ok((message, serde_json::to_value(data)?))
}

fn signed_in(caller: Option<Caller>) -> Result<Caller> {
    caller.ok_or_else(|| BookingError::Forbidden("authentication required".to_string()))
}

fn acting_as(caller: Option<Caller>, role: Role) -> Result<Caller> {
    let caller = signed_in(caller)?;
    caller.require(role)?;
    Ok(caller)
}
