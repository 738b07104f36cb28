use super::ids::UserId;
use crate::error::BookingError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Partner,
    Admin,
}

/// A verified caller, as produced by credential verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn require(&self, role: Role) -> Result<(), BookingError> {
        if self.role == role {
            Ok(())
        } else {
            Err(BookingError::Forbidden(format!(
                "this action requires the {:?} role",
                role
            )))
        }
    }
}
