use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExpenseQuery, LedgerRepository, Result, TemplateFilter, UserFilter};
use crate::domain::{Category, Expense, Payment, Period, RecurringExpense, User};
use crate::errors::LedgerError;

pub const SNAPSHOT_SCHEMA_VERSION: u8 = 1;

/// Complete serializable state of a household ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    #[serde(default = "LedgerSnapshot::current_schema")]
    pub schema_version: u8,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub templates: Vec<RecurringExpense>,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

impl LedgerSnapshot {
    fn current_schema() -> u8 {
        SNAPSHOT_SCHEMA_VERSION
    }
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            users: Vec::new(),
            categories: Vec::new(),
            expenses: Vec::new(),
            templates: Vec::new(),
            payments: Vec::new(),
        }
    }
}

/// Thread-safe in-process repository.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerSnapshot>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        Ok(self.read()?.clone())
    }

    /// Replaces the whole state with `snapshot`.
    pub fn restore(&self, snapshot: LedgerSnapshot) -> Result<()> {
        *self.write()? = snapshot;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerSnapshot>> {
        self.state
            .read()
            .map_err(|_| LedgerError::Storage("ledger state lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerSnapshot>> {
        self.state
            .write()
            .map_err(|_| LedgerError::Storage("ledger state lock poisoned".into()))
    }
}

fn missing(entity: &str, id: Uuid) -> LedgerError {
    LedgerError::Storage(format!("{entity} {id} does not exist"))
}

impl LedgerRepository for InMemoryLedger {
    fn find_users(&self, filter: UserFilter) -> Result<Vec<User>> {
        let state = self.read()?;
        Ok(state
            .users
            .iter()
            .filter(|user| filter.matches(user))
            .cloned()
            .collect())
    }

    fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.read()?.users.iter().find(|u| u.id == id).cloned())
    }

    fn create_user(&self, user: &User) -> Result<()> {
        let mut state = self.write()?;
        if state
            .users
            .iter()
            .any(|u| u.id == user.id || u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(LedgerError::Duplicate(format!("user `{}`", user.username)));
        }
        state.users.push(user.clone());
        Ok(())
    }

    fn find_categories(&self) -> Result<Vec<Category>> {
        Ok(self.read()?.categories.clone())
    }

    fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.read()?.categories.iter().find(|c| c.id == id).cloned())
    }

    fn create_category(&self, category: &Category) -> Result<()> {
        let mut state = self.write()?;
        if state.categories.iter().any(|c| c.id == category.id) {
            return Err(LedgerError::Duplicate(format!("category {}", category.id)));
        }
        state.categories.push(category.clone());
        Ok(())
    }

    fn find_expenses(&self, query: ExpenseQuery) -> Result<Vec<Expense>> {
        let state = self.read()?;
        let mut expenses: Vec<Expense> = state
            .expenses
            .iter()
            .filter(|expense| query.matches(expense))
            .cloned()
            .collect();
        expenses.sort_by(|a, b| {
            b.expense_date
                .cmp(&a.expense_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(expenses)
    }

    fn find_expense(&self, id: Uuid) -> Result<Option<Expense>> {
        Ok(self.read()?.expenses.iter().find(|e| e.id == id).cloned())
    }

    fn create_expense(&self, expense: &Expense) -> Result<()> {
        let mut state = self.write()?;
        if state.expenses.iter().any(|e| e.id == expense.id) {
            return Err(LedgerError::Duplicate(format!("expense {}", expense.id)));
        }
        if let Some(template_id) = expense.recurring_expense_id {
            let clash = state.expenses.iter().any(|e| {
                e.recurring_expense_id == Some(template_id) && e.period == expense.period
            });
            if clash {
                return Err(LedgerError::Duplicate(format!(
                    "template {template_id} already materialized for {}",
                    expense.period
                )));
            }
        }
        state.expenses.push(expense.clone());
        Ok(())
    }

    fn update_expense_fields(&self, expense: &Expense) -> Result<()> {
        let mut state = self.write()?;
        let slot = state
            .expenses
            .iter_mut()
            .find(|e| e.id == expense.id)
            .ok_or_else(|| missing("expense", expense.id))?;
        *slot = expense.clone();
        Ok(())
    }

    fn delete_expense(&self, id: Uuid) -> Result<bool> {
        let mut state = self.write()?;
        let before = state.expenses.len();
        state.expenses.retain(|e| e.id != id);
        Ok(state.expenses.len() != before)
    }

    fn count_expenses_for_template_and_month(
        &self,
        template_id: Uuid,
        period: Period,
    ) -> Result<usize> {
        let state = self.read()?;
        Ok(state
            .expenses
            .iter()
            .filter(|e| e.recurring_expense_id == Some(template_id) && e.period == period)
            .count())
    }

    fn find_templates(&self, filter: TemplateFilter) -> Result<Vec<RecurringExpense>> {
        let state = self.read()?;
        let mut templates: Vec<RecurringExpense> = state
            .templates
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    fn find_template(&self, id: Uuid) -> Result<Option<RecurringExpense>> {
        Ok(self.read()?.templates.iter().find(|t| t.id == id).cloned())
    }

    fn create_template(&self, template: &RecurringExpense) -> Result<()> {
        let mut state = self.write()?;
        if state.templates.iter().any(|t| t.id == template.id) {
            return Err(LedgerError::Duplicate(format!("template {}", template.id)));
        }
        state.templates.push(template.clone());
        Ok(())
    }

    fn update_template_fields(&self, template: &RecurringExpense) -> Result<()> {
        let mut state = self.write()?;
        let slot = state
            .templates
            .iter_mut()
            .find(|t| t.id == template.id)
            .ok_or_else(|| missing("template", template.id))?;
        *slot = template.clone();
        Ok(())
    }

    fn find_payments(&self, period: Period) -> Result<Vec<Payment>> {
        let state = self.read()?;
        let mut payments: Vec<Payment> = state
            .payments
            .iter()
            .filter(|p| p.period == period)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    fn create_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.write()?;
        if state.payments.iter().any(|p| p.id == payment.id) {
            return Err(LedgerError::Duplicate(format!("payment {}", payment.id)));
        }
        state.payments.push(payment.clone());
        Ok(())
    }

    fn delete_payment(&self, id: Uuid) -> Result<bool> {
        let mut state = self.write()?;
        let before = state.payments.len();
        state.payments.retain(|p| p.id != id);
        Ok(state.payments.len() != before)
    }
}
