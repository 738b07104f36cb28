use crate::domain::catalog::Service;
use crate::domain::money::Money;
use crate::domain::order::Order;
use rust_decimal::Decimal;

/// Splits a completed order's revenue between the platform and the partner.
#[derive(Debug, Clone, Copy)]
pub struct PayoutCalculator {
    partner_share: Decimal,
}

impl PayoutCalculator {
    pub fn new(partner_share: Decimal) -> Self {
        Self { partner_share }
    }

    /// `(order.total_amount - service.admin_fee) * partner_share`, rounded
    /// half away from zero to whole currency units.
    ///
    /// Uses the order's snapshotted total, never the service's current price.
    pub fn compute_payout(&self, order: &Order, service: &Service) -> Money {
        let base = order
            .total_amount
            .checked_sub(service.admin_fee)
            .unwrap_or(Money::ZERO);
        base.share(self.partner_share)
    }
}
