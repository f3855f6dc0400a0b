pub mod category_service;
pub mod expense_service;
pub mod payment_service;
pub mod recurrence_service;
pub mod settlement_service;
pub mod user_service;

pub use category_service::{CategoryService, DEFAULT_CATEGORIES};
pub use expense_service::{DeleteOutcome, ExpenseService};
pub use payment_service::PaymentService;
pub use recurrence_service::{
    FailurePolicy, Materialization, ProcessReport, RecurrenceService, TemplateFailure,
};
pub use settlement_service::{
    CategoryTotal, MonthlySummary, Settlement, SettlementCalculator, SettlementInput,
    SettlementService, UserBalance,
};
pub use user_service::UserService;

use uuid::Uuid;

use crate::core::errors::{ServiceError, ServiceResult};
use crate::domain::{Actor, Category, Money, User};
use crate::storage::LedgerRepository;

fn require_user(repo: &dyn LedgerRepository, id: Uuid) -> ServiceResult<User> {
    repo.find_user(id)?
        .ok_or_else(|| ServiceError::not_found("User", id))
}

fn require_category(repo: &dyn LedgerRepository, id: Uuid) -> ServiceResult<Category> {
    repo.find_category(id)?
        .ok_or_else(|| ServiceError::not_found("Category", id))
}

/// Positive, at most [`Money::MAX_AMOUNT`], and no finer than a cent.
fn validate_amount(amount: Money) -> ServiceResult<()> {
    if !amount.is_positive() {
        return Err(ServiceError::InvalidArgument(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if !amount.is_whole_cents() {
        return Err(ServiceError::InvalidArgument(
            "amount must not have more than two decimal places".into(),
        ));
    }
    if amount > Money::MAX_AMOUNT {
        return Err(ServiceError::InvalidArgument(format!(
            "amount must not exceed {}",
            Money::MAX_AMOUNT
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> ServiceResult<()> {
    if description.trim().is_empty() {
        Err(ServiceError::InvalidArgument(
            "description must not be empty".into(),
        ))
    } else {
        Ok(())
    }
}

/// Creators may not review their own records; admins may review anything.
fn ensure_reviewer(creator: Uuid, actor: &Actor, what: &str) -> ServiceResult<()> {
    if !actor.is_admin && creator == actor.id {
        return Err(ServiceError::Forbidden(format!(
            "you cannot review your own {what}"
        )));
    }
    Ok(())
}
