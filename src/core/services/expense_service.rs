//! Business logic for the single-expense lifecycle: create, edit, review,
//! and the two-party delete confirmation.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::{ensure_reviewer, require_category, require_user, validate_amount, validate_description};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::locks::EntityLocks;
use crate::core::time::Clock;
use crate::domain::{Actor, Expense, ExpensePatch, NewExpense, Period, SplitRatio};
use crate::storage::{ExpenseQuery, LedgerRepository};

/// What a delete call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record is gone.
    Deleted,
    /// A delete request is waiting for the other party.
    Requested(Expense),
}

/// Enforces who may change an expense and when.
pub struct ExpenseService {
    repo: Arc<dyn LedgerRepository>,
    clock: Arc<dyn Clock>,
    locks: EntityLocks,
}

impl ExpenseService {
    pub fn new(repo: Arc<dyn LedgerRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            locks: EntityLocks::new(),
        }
    }

    /// Records a new expense. Shared expenses wait for review; personal ones
    /// are approved straight away.
    pub fn create(&self, creator: Uuid, input: NewExpense) -> ServiceResult<Expense> {
        require_user(self.repo.as_ref(), creator)?;
        require_category(self.repo.as_ref(), input.category_id)?;
        validate_amount(input.amount)?;
        validate_description(&input.description)?;
        let split_ratio = SplitRatio::or_even(input.split_ratio)?;

        let expense = Expense::new(
            creator,
            input.category_id,
            input.description.trim(),
            input.amount,
            input.expense_date,
            input.is_shared,
            split_ratio,
            self.clock.now(),
        );
        self.repo.create_expense(&expense)?;
        info!(
            expense_id = %expense.id,
            creator = %creator,
            status = %expense.status,
            period = %expense.period,
            "expense created"
        );
        Ok(expense)
    }

    pub fn get(&self, id: Uuid) -> ServiceResult<Expense> {
        self.repo
            .find_expense(id)?
            .ok_or_else(|| ServiceError::not_found("Expense", id))
    }

    /// All expenses of a month regardless of status, newest first.
    pub fn list(&self, period: Period) -> ServiceResult<Vec<Expense>> {
        Ok(self.repo.find_expenses(ExpenseQuery::for_period(period))?)
    }

    /// Applies `patch` to a pending expense owned by `actor`.
    pub fn update(&self, id: Uuid, actor: Uuid, patch: ExpensePatch) -> ServiceResult<Expense> {
        self.locks.with_lock(id, || {
            let mut expense = self.get(id)?;
            if !expense.is_creator(actor) {
                return Err(ServiceError::Forbidden(
                    "only the creator can edit an expense".into(),
                ));
            }
            if !expense.status.is_pending() {
                return Err(ServiceError::InvalidState(format!(
                    "only pending expenses can be edited, this one is {}",
                    expense.status
                )));
            }
            if patch.is_empty() {
                return Ok(expense);
            }

            if let Some(description) = patch.description {
                validate_description(&description)?;
                expense.description = description.trim().to_string();
            }
            if let Some(amount) = patch.amount {
                validate_amount(amount)?;
                expense.amount = amount;
            }
            if let Some(category_id) = patch.category_id {
                require_category(self.repo.as_ref(), category_id)?;
                expense.category_id = category_id;
            }
            if let Some(date) = patch.expense_date {
                expense.set_expense_date(date);
            }
            if let Some(percent) = patch.split_ratio {
                expense.split_ratio = SplitRatio::or_even(Some(percent))?;
            }

            self.repo.update_expense_fields(&expense)?;
            debug!(expense_id = %id, "expense updated");
            Ok(expense)
        })
    }

    /// Admins delete outright; anyone else files a request that the other
    /// party has to confirm.
    pub fn delete(&self, id: Uuid, actor: &Actor) -> ServiceResult<DeleteOutcome> {
        self.locks.with_lock(id, || {
            let mut expense = self.get(id)?;
            if actor.is_admin {
                self.remove(id)?;
                info!(expense_id = %id, admin = %actor.id, "expense deleted by admin");
                return Ok(DeleteOutcome::Deleted);
            }
            if expense.delete_requested_by.is_some() {
                return Err(ServiceError::Conflict(
                    "a delete request already exists for this expense".into(),
                ));
            }
            expense.delete_requested_by = Some(actor.id);
            self.repo.update_expense_fields(&expense)?;
            info!(expense_id = %id, requester = %actor.id, "expense delete requested");
            Ok(DeleteOutcome::Requested(expense))
        })
    }

    /// Completes someone else's delete request.
    pub fn confirm_delete(&self, id: Uuid, confirmer: Uuid) -> ServiceResult<()> {
        self.locks.with_lock(id, || {
            let expense = self.get(id)?;
            let requester = expense.delete_requested_by.ok_or_else(|| {
                ServiceError::InvalidState("no delete request exists for this expense".into())
            })?;
            if requester == confirmer {
                return Err(ServiceError::Forbidden(
                    "you cannot confirm your own delete request".into(),
                ));
            }
            self.remove(id)?;
            info!(expense_id = %id, requester = %requester, confirmer = %confirmer, "expense deleted");
            Ok(())
        })
    }

    /// Withdraws a pending delete request; only its author may do so.
    pub fn cancel_delete(&self, id: Uuid, actor: Uuid) -> ServiceResult<Expense> {
        self.locks.with_lock(id, || {
            let mut expense = self.get(id)?;
            let requester = expense.delete_requested_by.ok_or_else(|| {
                ServiceError::InvalidState("no delete request exists for this expense".into())
            })?;
            if requester != actor {
                return Err(ServiceError::Forbidden(
                    "only the requester can cancel a delete request".into(),
                ));
            }
            expense.delete_requested_by = None;
            self.repo.update_expense_fields(&expense)?;
            info!(expense_id = %id, requester = %actor, "expense delete request cancelled");
            Ok(expense)
        })
    }

    pub fn approve(&self, id: Uuid, actor: &Actor) -> ServiceResult<Expense> {
        self.locks.with_lock(id, || {
            let mut expense = self.reviewable(id, actor)?;
            expense.mark_approved(actor.id, self.clock.now());
            self.repo.update_expense_fields(&expense)?;
            info!(expense_id = %id, approver = %actor.id, "expense approved");
            Ok(expense)
        })
    }

    /// Rejection is terminal; there is no way back to pending.
    pub fn reject(&self, id: Uuid, actor: &Actor) -> ServiceResult<Expense> {
        self.locks.with_lock(id, || {
            let mut expense = self.reviewable(id, actor)?;
            expense.mark_rejected();
            self.repo.update_expense_fields(&expense)?;
            info!(expense_id = %id, reviewer = %actor.id, "expense rejected");
            Ok(expense)
        })
    }

    fn reviewable(&self, id: Uuid, actor: &Actor) -> ServiceResult<Expense> {
        let expense = self.get(id)?;
        ensure_reviewer(expense.created_by, actor, "expense")?;
        if !expense.status.is_pending() {
            return Err(ServiceError::InvalidState(format!(
                "expense has already been {}",
                expense.status
            )));
        }
        Ok(expense)
    }

    fn remove(&self, id: Uuid) -> ServiceResult<()> {
        if self.repo.delete_expense(id)? {
            Ok(())
        } else {
            Err(ServiceError::not_found("Expense", id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::core::time::ManualClock;
    use crate::domain::{ApprovalStatus, Category, Money, User};
    use crate::storage::InMemoryLedger;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct Fixture {
        service: ExpenseService,
        alice: User,
        bob: User,
        admin: User,
        category: Category,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryLedger::new());
        let alice = User::new("alice", "Alice");
        let bob = User::new("bob", "Bob");
        let admin = User::new_admin("admin", "Admin");
        let category = Category::new("Groceries", "shopping-cart");
        repo.create_user(&alice).unwrap();
        repo.create_user(&bob).unwrap();
        repo.create_user(&admin).unwrap();
        repo.create_category(&category).unwrap();
        let clock = Arc::new(ManualClock::on(NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()));
        Fixture {
            service: ExpenseService::new(repo, clock),
            alice,
            bob,
            admin,
            category,
        }
    }

    fn shared(fx: &Fixture, amount: i64) -> NewExpense {
        NewExpense::shared(
            fx.category.id,
            "Weekly shop",
            Money::from_major(amount),
            NaiveDate::from_ymd_opt(2024, 4, 9).unwrap(),
        )
    }

    #[test]
    fn create_defaults_split_ratio_and_derives_period() {
        let fx = fixture();
        let expense = fx.service.create(fx.alice.id, shared(&fx, 60)).unwrap();
        assert_eq!(expense.split_ratio, SplitRatio::EVEN);
        assert_eq!(expense.status, ApprovalStatus::Pending);
        assert_eq!(expense.period, Period::new(4, 2024).unwrap());
    }

    #[test]
    fn create_rejects_unknown_category() {
        let fx = fixture();
        let mut input = shared(&fx, 10);
        input.category_id = Uuid::new_v4();
        let err = fx.service.create(fx.alice.id, input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn create_rejects_out_of_range_split() {
        let fx = fixture();
        let input = shared(&fx, 10).with_split_ratio(dec!(150));
        let err = fx.service.create(fx.alice.id, input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn update_requires_creator_and_pending_status() {
        let fx = fixture();
        let expense = fx.service.create(fx.alice.id, shared(&fx, 40)).unwrap();
        let patch = ExpensePatch {
            amount: Some(Money::from_major(45)),
            ..ExpensePatch::default()
        };

        let err = fx
            .service
            .update(expense.id, fx.bob.id, patch.clone())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let updated = fx
            .service
            .update(expense.id, fx.alice.id, patch.clone())
            .unwrap();
        assert_eq!(updated.amount, Money::from_major(45));

        fx.service.approve(expense.id, &fx.bob.actor()).unwrap();
        let err = fx.service.update(expense.id, fx.alice.id, patch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn approval_is_one_shot_and_never_by_the_creator() {
        let fx = fixture();
        let expense = fx.service.create(fx.alice.id, shared(&fx, 40)).unwrap();

        let err = fx.service.approve(expense.id, &fx.alice.actor()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let approved = fx.service.approve(expense.id, &fx.bob.actor()).unwrap();
        assert_eq!(approved.approved_by, Some(fx.bob.id));
        assert!(approved.approved_at.is_some());

        let err = fx.service.reject(expense.id, &fx.bob.actor()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn admin_may_review_own_expense() {
        let fx = fixture();
        let expense = fx.service.create(fx.admin.id, shared(&fx, 15)).unwrap();
        let rejected = fx.service.reject(expense.id, &fx.admin.actor()).unwrap();
        assert_eq!(rejected.status, ApprovalStatus::Rejected);
    }

    #[test]
    fn delete_request_flow() {
        let fx = fixture();
        let expense = fx.service.create(fx.alice.id, shared(&fx, 30)).unwrap();

        let outcome = fx.service.delete(expense.id, &fx.alice.actor()).unwrap();
        assert!(matches!(outcome, DeleteOutcome::Requested(ref e) if e.delete_requested_by == Some(fx.alice.id)));

        let err = fx.service.delete(expense.id, &fx.bob.actor()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = fx.service.confirm_delete(expense.id, fx.alice.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = fx.service.cancel_delete(expense.id, fx.bob.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let restored = fx.service.cancel_delete(expense.id, fx.alice.id).unwrap();
        assert_eq!(restored.delete_requested_by, None);

        let err = fx.service.confirm_delete(expense.id, fx.bob.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        fx.service.delete(expense.id, &fx.bob.actor()).unwrap();
        fx.service.confirm_delete(expense.id, fx.alice.id).unwrap();
        assert_eq!(fx.service.get(expense.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn admin_delete_is_immediate() {
        let fx = fixture();
        let expense = fx.service.create(fx.alice.id, shared(&fx, 30)).unwrap();
        let outcome = fx.service.delete(expense.id, &fx.admin.actor()).unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(fx
            .service
            .list(Period::new(4, 2024).unwrap())
            .unwrap()
            .is_empty());
    }
}
