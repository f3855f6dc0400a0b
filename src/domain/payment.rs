use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::common::*;
use crate::domain::money::Money;

/// A partial settlement of a month's debt. Never edited, only deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: Uuid,
    pub period: Period,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        period: Period,
        payer_id: Uuid,
        payee_id: Uuid,
        amount: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            period,
            payer_id,
            payee_id,
            amount,
            created_at,
        }
    }
}
