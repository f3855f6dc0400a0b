//! Monthly balances, who owes whom, and the category breakdown.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::core::errors::{ServiceError, ServiceResult};
use crate::domain::{ApprovalStatus, Category, Expense, Money, Payment, Period, User};
use crate::storage::{ExpenseQuery, LedgerRepository, UserFilter};

const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserBalance {
    pub user_id: Uuid,
    pub display_name: String,
    pub total_paid: Money,
    pub total_share: Money,
    /// Positive when the user paid more than their share.
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category_id: Uuid,
    pub name: String,
    pub icon: String,
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub debtor_id: Uuid,
    pub creditor_id: Uuid,
    pub debt_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub period: Period,
    pub shared_only: bool,
    pub total_expenses: Money,
    pub shared_expenses: Money,
    pub users: Vec<UserBalance>,
    pub settlement: Option<Settlement>,
    pub debt_amount: Money,
    pub total_payments: Money,
    pub remaining_debt: Money,
    pub category_breakdown: Vec<CategoryTotal>,
}

impl MonthlySummary {
    pub fn balance_of(&self, user_id: Uuid) -> Option<&UserBalance> {
        self.users.iter().find(|entry| entry.user_id == user_id)
    }

    pub fn is_settled(&self) -> bool {
        self.remaining_debt.is_zero()
    }
}

/// Everything the calculator reads for one month.
#[derive(Debug, Clone, Copy)]
pub struct SettlementInput<'a> {
    pub period: Period,
    pub shared_only: bool,
    pub expenses: &'a [Expense],
    pub users: &'a [User],
    pub categories: &'a [Category],
    pub payments: &'a [Payment],
}

struct Accumulator<'a> {
    user: &'a User,
    paid: Money,
    share: Money,
}

/// Pure settlement math over already-fetched records.
pub struct SettlementCalculator;

impl SettlementCalculator {
    pub fn compute(input: SettlementInput<'_>) -> ServiceResult<MonthlySummary> {
        let participants: Vec<&User> = input.users.iter().filter(|u| !u.is_admin).collect();
        if participants.len() > 2 {
            return Err(ServiceError::InvalidState(format!(
                "settlement supports two participants, found {}",
                participants.len()
            )));
        }

        let mut accumulators: Vec<Accumulator<'_>> = participants
            .into_iter()
            .map(|user| Accumulator {
                user,
                paid: Money::ZERO,
                share: Money::ZERO,
            })
            .collect();
        let slot: HashMap<Uuid, usize> = accumulators
            .iter()
            .enumerate()
            .map(|(idx, acc)| (acc.user.id, idx))
            .collect();

        let mut total_expenses = Money::ZERO;
        let mut shared_expenses = Money::ZERO;
        let mut by_category: HashMap<Uuid, Money> = HashMap::new();

        let counted = input.expenses.iter().filter(|expense| {
            expense.status == ApprovalStatus::Approved
                && expense.period == input.period
                && (!input.shared_only || expense.is_shared)
        });
        for expense in counted {
            within_ceiling(expense.amount, "expense", expense.id)?;
            total_expenses += expense.amount;
            *by_category.entry(expense.category_id).or_default() += expense.amount;
            let creator = slot.get(&expense.created_by).copied();
            if let Some(idx) = creator {
                accumulators[idx].paid += expense.amount;
            }

            if !expense.is_shared {
                if let Some(idx) = creator {
                    accumulators[idx].share += expense.amount;
                }
                continue;
            }

            shared_expenses += expense.amount;
            let creator_share = expense.split_ratio.creator_share(expense.amount);
            let other_share = expense.split_ratio.other_share(expense.amount);
            for (idx, acc) in accumulators.iter_mut().enumerate() {
                if Some(idx) == creator {
                    acc.share += creator_share;
                } else {
                    acc.share += other_share;
                }
            }
        }

        let users: Vec<UserBalance> = accumulators
            .iter()
            .map(|acc| UserBalance {
                user_id: acc.user.id,
                display_name: acc.user.display_name.clone(),
                total_paid: acc.paid.round_cents(),
                total_share: acc.share.round_cents(),
                balance: (acc.paid - acc.share).round_cents(),
            })
            .collect();

        let settlement = match users.as_slice() {
            [first, second] if first.balance.is_positive() => Some(Settlement {
                creditor_id: first.user_id,
                debtor_id: second.user_id,
                debt_amount: first.balance.round_cents(),
            }),
            [first, second] if second.balance.is_positive() => Some(Settlement {
                creditor_id: second.user_id,
                debtor_id: first.user_id,
                debt_amount: second.balance.round_cents(),
            }),
            _ => None,
        };
        let debt_amount = settlement.map_or(Money::ZERO, |s| s.debt_amount);

        let mut paid_back = Money::ZERO;
        for payment in input.payments.iter().filter(|p| p.period == input.period) {
            within_ceiling(payment.amount, "payment", payment.id)?;
            paid_back += payment.amount;
        }
        let remaining_debt = (debt_amount - paid_back).round_cents().max(Money::ZERO);

        Ok(MonthlySummary {
            period: input.period,
            shared_only: input.shared_only,
            total_expenses: total_expenses.round_cents(),
            shared_expenses: shared_expenses.round_cents(),
            users,
            settlement,
            debt_amount,
            total_payments: paid_back.round_cents(),
            remaining_debt,
            category_breakdown: category_breakdown(by_category, input.categories),
        })
    }
}

/// Stored records can bypass service validation; past the ceiling the
/// aggregates could leave the decimal range.
fn within_ceiling(amount: Money, what: &str, id: Uuid) -> ServiceResult<()> {
    if amount > Money::MAX_AMOUNT || -amount > Money::MAX_AMOUNT {
        return Err(ServiceError::InvalidArgument(format!(
            "{what} {id} amount {amount} is outside the supported range"
        )));
    }
    Ok(())
}

fn category_breakdown(totals: HashMap<Uuid, Money>, categories: &[Category]) -> Vec<CategoryTotal> {
    let mut breakdown: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category_id, total)| {
            let known = categories.iter().find(|c| c.id == category_id);
            CategoryTotal {
                category_id,
                name: known.map_or_else(|| UNCATEGORIZED.to_string(), |c| c.name.clone()),
                icon: known.map(|c| c.icon.clone()).unwrap_or_default(),
                total: total.round_cents(),
            }
        })
        .collect();
    breakdown.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    breakdown
}

/// Reads a month from the repository and runs [`SettlementCalculator`].
pub struct SettlementService {
    repo: Arc<dyn LedgerRepository>,
}

impl SettlementService {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub fn monthly_summary(&self, period: Period, shared_only: bool) -> ServiceResult<MonthlySummary> {
        let mut query = ExpenseQuery::approved(period);
        if shared_only {
            query = query.shared_only();
        }
        let expenses = self.repo.find_expenses(query)?;
        let users = self.repo.find_users(UserFilter::Members)?;
        let categories = self.repo.find_categories()?;
        let payments = self.repo.find_payments(period)?;

        let summary = SettlementCalculator::compute(SettlementInput {
            period,
            shared_only,
            expenses: &expenses,
            users: &users,
            categories: &categories,
            payments: &payments,
        })?;
        debug!(
            month = period.month(),
            year = period.year(),
            expenses = expenses.len(),
            remaining = %summary.remaining_debt,
            "monthly summary computed"
        );
        Ok(summary)
    }
}
