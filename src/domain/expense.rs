//! Expense records and the inputs used to create or amend them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::common::*;
use crate::domain::money::{Money, SplitRatio};

/// A single spending record belonging to one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Expense {
    pub id: Uuid,
    pub created_by: Uuid,
    pub category_id: Uuid,
    pub description: String,
    pub amount: Money,
    pub expense_date: NaiveDate,
    pub period: Period,
    pub is_shared: bool,
    #[serde(default)]
    pub split_ratio: SplitRatio,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_no: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_expense_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_requested_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Builds a record for `expense_date`'s month. Personal (non-shared)
    /// expenses need no review and start out approved.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        created_by: Uuid,
        category_id: Uuid,
        description: impl Into<String>,
        amount: Money,
        expense_date: NaiveDate,
        is_shared: bool,
        split_ratio: SplitRatio,
        created_at: DateTime<Utc>,
    ) -> Self {
        let status = if is_shared {
            ApprovalStatus::Pending
        } else {
            ApprovalStatus::Approved
        };
        Self {
            id: Uuid::new_v4(),
            created_by,
            category_id,
            description: description.into(),
            amount,
            expense_date,
            period: Period::of(expense_date),
            is_shared,
            split_ratio,
            status,
            approved_by: None,
            approved_at: None,
            installment_no: None,
            installment_total: None,
            recurring_expense_id: None,
            delete_requested_by: None,
            created_at,
        }
    }

    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.created_by == user_id
    }

    pub fn set_expense_date(&mut self, date: NaiveDate) {
        self.expense_date = date;
        self.period = Period::of(date);
    }

    pub fn mark_approved(&mut self, approver: Uuid, at: DateTime<Utc>) {
        self.status = ApprovalStatus::Approved;
        self.approved_by = Some(approver);
        self.approved_at = Some(at);
    }

    pub fn mark_rejected(&mut self) {
        self.status = ApprovalStatus::Rejected;
    }
}

/// Caller-supplied fields for a new expense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NewExpense {
    pub category_id: Uuid,
    pub description: String,
    pub amount: Money,
    pub expense_date: NaiveDate,
    #[serde(default = "default_shared")]
    pub is_shared: bool,
    #[serde(default)]
    pub split_ratio: Option<Decimal>,
}

impl NewExpense {
    pub fn shared(
        category_id: Uuid,
        description: impl Into<String>,
        amount: Money,
        expense_date: NaiveDate,
    ) -> Self {
        Self {
            category_id,
            description: description.into(),
            amount,
            expense_date,
            is_shared: true,
            split_ratio: None,
        }
    }

    pub fn personal(
        category_id: Uuid,
        description: impl Into<String>,
        amount: Money,
        expense_date: NaiveDate,
    ) -> Self {
        Self {
            is_shared: false,
            ..Self::shared(category_id, description, amount, expense_date)
        }
    }

    pub fn with_split_ratio(mut self, percent: Decimal) -> Self {
        self.split_ratio = Some(percent);
        self
    }
}

fn default_shared() -> bool {
    true
}

/// Whitelisted partial update for a pending expense. Absent fields are left
/// untouched; anything outside this list is refused when deserializing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExpensePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_ratio: Option<Decimal>,
}

impl ExpensePatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.amount.is_none()
            && self.category_id.is_none()
            && self.expense_date.is_none()
            && self.split_ratio.is_none()
    }
}
