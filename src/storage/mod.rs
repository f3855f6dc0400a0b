//! Persistence boundary for the ledger.
//!
//! Services only ever talk to [`LedgerRepository`]; the concrete backends in
//! this module are an in-memory store and a JSON snapshot file layered on it.

pub mod json_backend;
pub mod memory;

use uuid::Uuid;

use crate::domain::{
    ApprovalStatus, Category, Expense, Payment, Period, RecurringExpense, User,
};
use crate::errors::LedgerError;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Selects which users a lookup returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserFilter {
    #[default]
    All,
    /// Only the people who share bills.
    Members,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserFilter::All => true,
            UserFilter::Members => !user.is_admin,
        }
    }
}

/// Expense lookup for a single month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseQuery {
    pub period: Period,
    pub status: Option<ApprovalStatus>,
    pub shared: Option<bool>,
}

impl ExpenseQuery {
    pub fn for_period(period: Period) -> Self {
        Self {
            period,
            status: None,
            shared: None,
        }
    }

    pub fn approved(period: Period) -> Self {
        Self {
            status: Some(ApprovalStatus::Approved),
            ..Self::for_period(period)
        }
    }

    pub fn shared_only(mut self) -> Self {
        self.shared = Some(true);
        self
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        expense.period == self.period
            && self.status.map_or(true, |status| expense.status == status)
            && self.shared.map_or(true, |shared| expense.is_shared == shared)
    }
}

/// Template lookup; `None` fields do not filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemplateFilter {
    pub active: Option<bool>,
    pub status: Option<ApprovalStatus>,
}

impl TemplateFilter {
    /// Templates the daily job should materialize.
    pub fn due() -> Self {
        Self {
            active: Some(true),
            status: Some(ApprovalStatus::Approved),
        }
    }

    pub fn matches(&self, template: &RecurringExpense) -> bool {
        self.active.map_or(true, |active| template.is_active == active)
            && self.status.map_or(true, |status| template.status == status)
    }
}

/// Abstraction over persistence backends for users, categories, expenses,
/// recurring templates, and payments.
///
/// `create_expense` must refuse a second materialized expense for the same
/// template and month with [`LedgerError::Duplicate`].
pub trait LedgerRepository: Send + Sync {
    fn find_users(&self, filter: UserFilter) -> Result<Vec<User>>;
    fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    fn create_user(&self, user: &User) -> Result<()>;

    fn find_categories(&self) -> Result<Vec<Category>>;
    fn find_category(&self, id: Uuid) -> Result<Option<Category>>;
    fn create_category(&self, category: &Category) -> Result<()>;

    /// Ordered by expense date, then creation time, newest first.
    fn find_expenses(&self, query: ExpenseQuery) -> Result<Vec<Expense>>;
    fn find_expense(&self, id: Uuid) -> Result<Option<Expense>>;
    fn create_expense(&self, expense: &Expense) -> Result<()>;
    fn update_expense_fields(&self, expense: &Expense) -> Result<()>;
    fn delete_expense(&self, id: Uuid) -> Result<bool>;
    fn count_expenses_for_template_and_month(&self, template_id: Uuid, period: Period)
        -> Result<usize>;

    fn find_templates(&self, filter: TemplateFilter) -> Result<Vec<RecurringExpense>>;
    fn find_template(&self, id: Uuid) -> Result<Option<RecurringExpense>>;
    fn create_template(&self, template: &RecurringExpense) -> Result<()>;
    fn update_template_fields(&self, template: &RecurringExpense) -> Result<()>;

    fn find_payments(&self, period: Period) -> Result<Vec<Payment>>;
    fn create_payment(&self, payment: &Payment) -> Result<()>;
    fn delete_payment(&self, id: Uuid) -> Result<bool>;
}

pub use json_backend::JsonLedgerStore;
pub use memory::{InMemoryLedger, LedgerSnapshot};
