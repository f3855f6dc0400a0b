//! Recurring and installment expense templates.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::common::*;
use crate::domain::money::{Money, SplitRatio};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecurringKind {
    /// Charged every month until deactivated.
    Recurring,
    /// Charged a fixed number of months.
    Installment,
}

impl fmt::Display for RecurringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecurringKind::Recurring => "recurring",
            RecurringKind::Installment => "installment",
        };
        f.write_str(label)
    }
}

/// Template from which one expense per calendar month is materialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringExpense {
    pub id: Uuid,
    pub created_by: Uuid,
    pub category_id: Uuid,
    pub description: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Money>,
    pub kind: RecurringKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installments_remaining: Option<u32>,
    pub is_shared: bool,
    #[serde(default)]
    pub split_ratio: SplitRatio,
    pub is_active: bool,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RecurringExpense {
    pub fn is_installment(&self) -> bool {
        self.kind == RecurringKind::Installment
    }

    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.created_by == user_id
    }

    /// True once an installment plan has no charges left.
    pub fn is_exhausted(&self) -> bool {
        self.is_installment() && self.installments_remaining.unwrap_or(0) == 0
    }

    /// 1-based number of the installment the next materialization produces.
    pub fn next_installment_no(&self) -> Option<u32> {
        match (self.kind, self.installment_count, self.installments_remaining) {
            (RecurringKind::Installment, Some(count), Some(remaining)) if remaining > 0 => {
                Some(count.saturating_sub(remaining) + 1)
            }
            _ => None,
        }
    }

    /// Consumes one installment, deactivating the template on the last one.
    pub fn consume_installment(&mut self) {
        if !self.is_installment() {
            return;
        }
        let remaining = self.installments_remaining.unwrap_or(0).saturating_sub(1);
        self.installments_remaining = Some(remaining);
        if remaining == 0 {
            self.is_active = false;
        }
    }
}

/// Caller-supplied fields for a new template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NewTemplate {
    pub category_id: Uuid,
    pub description: String,
    pub amount: Money,
    #[serde(default)]
    pub total_amount: Option<Money>,
    pub kind: RecurringKind,
    #[serde(default)]
    pub installment_count: Option<u32>,
    #[serde(default = "default_shared")]
    pub is_shared: bool,
    #[serde(default)]
    pub split_ratio: Option<Decimal>,
}

impl NewTemplate {
    pub fn recurring(category_id: Uuid, description: impl Into<String>, amount: Money) -> Self {
        Self {
            category_id,
            description: description.into(),
            amount,
            total_amount: None,
            kind: RecurringKind::Recurring,
            installment_count: None,
            is_shared: true,
            split_ratio: None,
        }
    }

    pub fn installment(
        category_id: Uuid,
        description: impl Into<String>,
        amount: Money,
        installment_count: u32,
    ) -> Self {
        Self {
            kind: RecurringKind::Installment,
            installment_count: Some(installment_count),
            ..Self::recurring(category_id, description, amount)
        }
    }
}

fn default_shared() -> bool {
    true
}

/// Whitelisted partial update for a template; affects future months only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_shared: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_ratio: Option<Decimal>,
}
