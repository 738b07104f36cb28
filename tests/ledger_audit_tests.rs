mod common;

use common::Platform;
use homecare_ledger::config::BookingPolicy;
use homecare_ledger::domain::ids::{OrderId, UserId};
use homecare_ledger::domain::money::Money;
use homecare_ledger::domain::wallet::{BankDetails, Decision, TransactionStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Seeded mix of earnings, withdrawals and resolutions across a few
/// partners. After every step the stored balance must equal
/// `sum(income SUCCESS) - sum(withdrawal PENDING or SUCCESS)`.
#[tokio::test]
async fn test_balance_matches_ledger_after_every_step() {
    let platform = Platform::with_policy(BookingPolicy::new(dec!(1), dec!(0.85)).unwrap());
    let partners = [UserId(100), UserId(101), UserId(102)];
    let mut pending = Vec::new();
    let mut rng = StdRng::seed_from_u64(7);

    for step in 0..120u64 {
        let user = partners[rng.gen_range(0..partners.len())];
        let amount = Money::new(Decimal::from(rng.gen_range(1..=500u32))).unwrap();

        match step % 4 {
            0 | 1 => {
                platform
                    .wallets
                    .credit_earnings(user, amount, OrderId(step + 1))
                    .await
                    .unwrap();
            }
            2 => {
                let bank = BankDetails {
                    bank: "BNI".to_string(),
                    account_number: format!("{}", user),
                };
                if let Ok(tx) = platform.wallets.request_withdrawal(user, amount, bank).await {
                    pending.push(tx.id);
                }
            }
            _ => {
                if let Some(id) = pending.pop() {
                    let decision = if rng.gen_bool(0.5) {
                        Decision::Approve
                    } else {
                        Decision::Reject
                    };
                    platform
                        .wallets
                        .resolve_withdrawal(id, decision)
                        .await
                        .unwrap();
                }
            }
        }

        for partner in partners {
            let audit = platform.wallets.audit(partner).await.unwrap();
            assert!(audit.is_consistent(), "step {step}: {audit:?}");
            assert!(audit.balance.0 >= Decimal::ZERO);
        }
    }

    let still_pending = platform
        .wallets
        .withdrawals(Some(TransactionStatus::Pending))
        .await
        .unwrap();
    assert_eq!(still_pending.len(), pending.len());
}
