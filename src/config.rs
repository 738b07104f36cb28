use crate::error::BookingError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Platform policy values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// Smallest amount a partner may withdraw.
    pub minimum_withdrawal: Decimal,
    /// Fraction of `total - admin fee` paid to the partner.
    pub partner_share: Decimal,
}

impl BookingPolicy {
    pub const DEFAULT_MINIMUM_WITHDRAWAL: Decimal = dec!(10000);
    pub const DEFAULT_PARTNER_SHARE: Decimal = dec!(0.85);

    pub fn new(minimum_withdrawal: Decimal, partner_share: Decimal) -> Result<Self, BookingError> {
        if minimum_withdrawal <= Decimal::ZERO {
            return Err(BookingError::ValidationError(
                "Minimum withdrawal must be positive".to_string(),
            ));
        }
        if partner_share <= Decimal::ZERO || partner_share > Decimal::ONE {
            return Err(BookingError::ValidationError(
                "Partner share must be in (0, 1]".to_string(),
            ));
        }
        Ok(Self {
            minimum_withdrawal,
            partner_share,
        })
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            minimum_withdrawal: Self::DEFAULT_MINIMUM_WITHDRAWAL,
            partner_share: Self::DEFAULT_PARTNER_SHARE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = BookingPolicy::default();
        assert_eq!(policy.minimum_withdrawal, dec!(10000));
        assert_eq!(policy.partner_share, dec!(0.85));
    }

    #[test]
    fn test_rejects_out_of_range_share() {
        assert!(BookingPolicy::new(dec!(10), dec!(1.2)).is_err());
        assert!(BookingPolicy::new(dec!(10), dec!(0)).is_err());
        assert!(BookingPolicy::new(dec!(0), dec!(0.5)).is_err());
        assert!(BookingPolicy::new(dec!(10), dec!(1)).is_ok());
    }
}
