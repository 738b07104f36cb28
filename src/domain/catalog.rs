use super::ids::{PartnerId, ServiceId, UserId};
use super::money::Money;
use crate::error::BookingError;
use serde::{Deserialize, Serialize};

/// A bookable service. Its price is copied into each order at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub price: Money,
    pub admin_fee: Money,
}

impl Service {
    /// What the customer pays: price plus the platform's fee.
    pub fn total(&self) -> Money {
        self.price + self.admin_fee
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        check_listing(&self.name, self.total())
    }
}

/// A bookable listing needs a name and a non-zero total, since the gateway
/// cannot open a session for nothing.
pub fn check_listing(name: &str, total: Money) -> Result<(), BookingError> {
    if name.trim().is_empty() {
        return Err(BookingError::ValidationError(
            "Service name is required".to_string(),
        ));
    }
    if total.is_zero() {
        return Err(BookingError::ValidationError(
            "Service price plus admin fee must be positive".to_string(),
        ));
    }
    Ok(())
}

/// A field partner. Wallets hang off `user_id`, orders reference `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerProfile {
    pub id: PartnerId,
    pub user_id: UserId,
    /// Online partners receive open-booking broadcasts.
    pub is_active: bool,
}
