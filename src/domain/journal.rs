use super::ids::{JournalId, OrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default)]
    pub blood_pressure: String,
    #[serde(default)]
    pub temperature: String,
    #[serde(default)]
    pub pulse: String,
}

/// What the partner submits when finishing a visit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalPayload {
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub photo_url: String,
}

/// The care report of a completed order. Exactly one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareJournal {
    pub id: JournalId,
    pub order_id: OrderId,
    pub vitals: Vitals,
    pub notes: String,
    pub photo_url: String,
    pub logged_at: DateTime<Utc>,
}

impl CareJournal {
    pub fn from_payload(
        id: JournalId,
        order_id: OrderId,
        payload: JournalPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            vitals: payload.vitals,
            notes: payload.notes,
            photo_url: payload.photo_url,
            logged_at: now,
        }
    }
}
