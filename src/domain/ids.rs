//! Strongly typed row identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl $name {
                pub fn value(self) -> u64 {
                    self.0
                }

                pub fn to_key(self) -> [u8; 8] {
                    self.0.to_be_bytes()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<u64> for $name {
                fn from(value: u64) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

id_type!(
    /// A user account, as yielded by credential verification.
    UserId,
    /// A partner profile. Distinct from the partner's `UserId`.
    PartnerId,
    PatientId,
    ServiceId,
    OrderId,
    JournalId,
    WalletId,
    TransactionId,
);
