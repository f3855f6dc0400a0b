//! Recurring and installment templates, and their monthly materialization.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ensure_reviewer, require_category, require_user, validate_amount, validate_description};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::locks::EntityLocks;
use crate::core::time::Clock;
use crate::domain::{
    Actor, ApprovalStatus, Expense, NewTemplate, Period, RecurringExpense, RecurringKind,
    SplitRatio, TemplatePatch,
};
use crate::errors::LedgerError;
use crate::storage::{LedgerRepository, TemplateFilter};

/// How a batch run reacts when one template fails to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and carry on with the remaining templates.
    #[default]
    Isolate,
    /// Stop at the first failure and return it.
    AbortBatch,
}

/// Result of materializing one template for one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
    Created(Expense),
    /// An expense for this template and month already exists.
    AlreadyMaterialized,
    /// The installment plan had nothing left; the template was deactivated.
    Exhausted,
    /// The template was deactivated earlier.
    Inactive,
}

impl Materialization {
    pub fn created(&self) -> Option<&Expense> {
        match self {
            Materialization::Created(expense) => Some(expense),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TemplateFailure {
    pub template_id: Uuid,
    pub error: ServiceError,
}

/// Aggregate outcome of [`RecurrenceService::process_due`].
#[derive(Debug)]
pub struct ProcessReport {
    pub run_date: NaiveDate,
    pub examined: usize,
    pub created: Vec<Expense>,
    pub skipped: usize,
    pub failures: Vec<TemplateFailure>,
}

impl ProcessReport {
    fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            examined: 0,
            created: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns template approval and turns approved templates into one expense per
/// calendar month.
pub struct RecurrenceService {
    repo: Arc<dyn LedgerRepository>,
    clock: Arc<dyn Clock>,
    locks: EntityLocks,
    policy: FailurePolicy,
}

impl RecurrenceService {
    pub fn new(repo: Arc<dyn LedgerRepository>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(repo, clock, FailurePolicy::default())
    }

    pub fn with_policy(
        repo: Arc<dyn LedgerRepository>,
        clock: Arc<dyn Clock>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            repo,
            clock,
            locks: EntityLocks::new(),
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn create_template(
        &self,
        creator: Uuid,
        input: NewTemplate,
    ) -> ServiceResult<RecurringExpense> {
        require_user(self.repo.as_ref(), creator)?;
        require_category(self.repo.as_ref(), input.category_id)?;
        validate_amount(input.amount)?;
        validate_description(&input.description)?;
        if let Some(total) = input.total_amount {
            validate_amount(total)?;
        }
        let split_ratio = SplitRatio::or_even(input.split_ratio)?;

        let (installment_count, installments_remaining) = match input.kind {
            RecurringKind::Installment => match input.installment_count {
                Some(count) if count > 0 => (Some(count), Some(count)),
                _ => {
                    return Err(ServiceError::InvalidArgument(
                        "installment templates need a positive installment count".into(),
                    ))
                }
            },
            RecurringKind::Recurring => (None, None),
        };

        let template = RecurringExpense {
            id: Uuid::new_v4(),
            created_by: creator,
            category_id: input.category_id,
            description: input.description.trim().to_string(),
            amount: input.amount,
            total_amount: input.total_amount,
            kind: input.kind,
            installment_count,
            installments_remaining,
            is_shared: input.is_shared,
            split_ratio,
            is_active: true,
            status: ApprovalStatus::Pending,
            approved_by: None,
            created_at: self.clock.now(),
        };
        self.repo.create_template(&template)?;
        info!(template_id = %template.id, creator = %creator, kind = %template.kind, "template created");
        Ok(template)
    }

    pub fn get_template(&self, id: Uuid) -> ServiceResult<RecurringExpense> {
        self.repo
            .find_template(id)?
            .ok_or_else(|| ServiceError::not_found("Template", id))
    }

    /// Every template, active or not, newest first.
    pub fn list_templates(&self) -> ServiceResult<Vec<RecurringExpense>> {
        Ok(self.repo.find_templates(TemplateFilter::default())?)
    }

    /// Creator-only edit of an active template. Months already materialized
    /// keep their old values.
    pub fn update_template(
        &self,
        id: Uuid,
        actor: Uuid,
        patch: TemplatePatch,
    ) -> ServiceResult<RecurringExpense> {
        self.locks.with_lock(id, || {
            let mut template = self.get_template(id)?;
            if !template.is_creator(actor) {
                return Err(ServiceError::Forbidden(
                    "only the creator can edit a template".into(),
                ));
            }
            if !template.is_active {
                return Err(ServiceError::InvalidState(
                    "deactivated templates are kept for history and cannot be edited".into(),
                ));
            }
            if let Some(description) = patch.description {
                validate_description(&description)?;
                template.description = description.trim().to_string();
            }
            if let Some(amount) = patch.amount {
                validate_amount(amount)?;
                template.amount = amount;
            }
            if let Some(category_id) = patch.category_id {
                require_category(self.repo.as_ref(), category_id)?;
                template.category_id = category_id;
            }
            if let Some(is_shared) = patch.is_shared {
                template.is_shared = is_shared;
            }
            if let Some(percent) = patch.split_ratio {
                template.split_ratio = SplitRatio::or_even(Some(percent))?;
            }
            self.repo.update_template_fields(&template)?;
            debug!(template_id = %id, "template updated");
            Ok(template)
        })
    }

    /// Stops future materialization. The template itself is retained.
    pub fn deactivate_template(&self, id: Uuid, actor: &Actor) -> ServiceResult<RecurringExpense> {
        self.locks.with_lock(id, || {
            let mut template = self.get_template(id)?;
            if !actor.is_admin && !template.is_creator(actor.id) {
                return Err(ServiceError::Forbidden(
                    "only the creator can deactivate a template".into(),
                ));
            }
            if template.is_active {
                template.is_active = false;
                self.repo.update_template_fields(&template)?;
                info!(template_id = %id, actor = %actor.id, "template deactivated");
            }
            Ok(template)
        })
    }

    /// Approves a pending template and immediately materializes the current
    /// month.
    pub fn approve_template(
        &self,
        id: Uuid,
        actor: &Actor,
    ) -> ServiceResult<(RecurringExpense, Materialization)> {
        self.locks.with_lock(id, || {
            let mut template = self.reviewable(id, actor)?;
            template.status = ApprovalStatus::Approved;
            template.approved_by = Some(actor.id);
            self.repo.update_template_fields(&template)?;
            info!(template_id = %id, approver = %actor.id, "template approved");

            let outcome = self.materialize_locked(id, self.clock.today())?;
            let template = self.get_template(id)?;
            Ok((template, outcome))
        })
    }

    /// Terminal; a rejected template never materializes.
    pub fn reject_template(&self, id: Uuid, actor: &Actor) -> ServiceResult<RecurringExpense> {
        self.locks.with_lock(id, || {
            let mut template = self.reviewable(id, actor)?;
            template.status = ApprovalStatus::Rejected;
            self.repo.update_template_fields(&template)?;
            info!(template_id = %id, reviewer = %actor.id, "template rejected");
            Ok(template)
        })
    }

    /// Creates the expense for `target`'s month unless one already exists.
    /// Safe to call any number of times.
    pub fn materialize_for_month(
        &self,
        template_id: Uuid,
        target: NaiveDate,
    ) -> ServiceResult<Materialization> {
        self.locks
            .with_lock(template_id, || self.materialize_locked(template_id, target))
    }

    /// Materializes every active, approved template for today's month.
    pub fn process_due(&self) -> ServiceResult<ProcessReport> {
        let today = self.clock.today();
        let templates = self.repo.find_templates(TemplateFilter::due())?;
        info!(count = templates.len(), run_date = %today, "processing recurring templates");

        let mut report = ProcessReport::new(today);
        for template in templates {
            report.examined += 1;
            match self.materialize_for_month(template.id, today) {
                Ok(Materialization::Created(expense)) => report.created.push(expense),
                Ok(_) => report.skipped += 1,
                Err(err) => {
                    error!(template_id = %template.id, error = %err, "materialization failed");
                    if self.policy == FailurePolicy::AbortBatch {
                        return Err(err);
                    }
                    report.failures.push(TemplateFailure {
                        template_id: template.id,
                        error: err,
                    });
                }
            }
        }

        if report.is_complete() {
            info!(
                created = report.created.len(),
                skipped = report.skipped,
                "recurring templates processed"
            );
        } else {
            warn!(
                created = report.created.len(),
                failed = report.failures.len(),
                "recurring templates processed with failures"
            );
        }
        Ok(report)
    }

    fn reviewable(&self, id: Uuid, actor: &Actor) -> ServiceResult<RecurringExpense> {
        let template = self.get_template(id)?;
        ensure_reviewer(template.created_by, actor, "template")?;
        if !template.status.is_pending() {
            return Err(ServiceError::InvalidState(format!(
                "template has already been {}",
                template.status
            )));
        }
        Ok(template)
    }

    fn materialize_locked(
        &self,
        template_id: Uuid,
        target: NaiveDate,
    ) -> ServiceResult<Materialization> {
        let mut template = self.get_template(template_id)?;
        if template.status != ApprovalStatus::Approved {
            return Err(ServiceError::InvalidState(format!(
                "template is {} and cannot produce expenses",
                template.status
            )));
        }
        if !template.is_active {
            return Ok(Materialization::Inactive);
        }

        let period = Period::of(target);
        if self
            .repo
            .count_expenses_for_template_and_month(template_id, period)?
            > 0
        {
            debug!(template_id = %template_id, period = %period, "already materialized");
            return Ok(Materialization::AlreadyMaterialized);
        }

        if template.is_exhausted() {
            template.is_active = false;
            self.repo.update_template_fields(&template)?;
            warn!(template_id = %template_id, "installment plan had no charges left, deactivated");
            return Ok(Materialization::Exhausted);
        }

        let now = self.clock.now();
        let mut expense = Expense::new(
            template.created_by,
            template.category_id,
            template.description.clone(),
            template.amount,
            target,
            template.is_shared,
            template.split_ratio,
            now,
        );
        expense.status = ApprovalStatus::Approved;
        expense.approved_by = template.approved_by;
        expense.approved_at = Some(now);
        expense.recurring_expense_id = Some(template_id);
        if let Some(number) = template.next_installment_no() {
            expense.installment_no = Some(number);
            expense.installment_total = template.installment_count;
        }

        match self.repo.create_expense(&expense) {
            Ok(()) => {}
            Err(LedgerError::Duplicate(reason)) => {
                debug!(template_id = %template_id, %reason, "lost materialization race");
                return Ok(Materialization::AlreadyMaterialized);
            }
            Err(err) => return Err(err.into()),
        }

        if template.is_installment() {
            template.consume_installment();
            self.repo.update_template_fields(&template)?;
        }
        info!(
            template_id = %template_id,
            expense_id = %expense.id,
            period = %period,
            installment = ?expense.installment_no,
            "template materialized"
        );
        Ok(Materialization::Created(expense))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::core::time::ManualClock;
    use crate::domain::{Category, Money, Payment, User};
    use crate::storage::{ExpenseQuery, InMemoryLedger, UserFilter};
    use std::sync::Mutex;

    type LedgerResult<T> = crate::storage::Result<T>;

    /// In-memory ledger whose expense writes fail for one chosen template.
    #[derive(Default)]
    struct FlakyLedger {
        inner: InMemoryLedger,
        failing_template: Mutex<Option<Uuid>>,
    }

    impl FlakyLedger {
        fn fail_writes_for(&self, template_id: Uuid) {
            *self.failing_template.lock().unwrap() = Some(template_id);
        }
    }

    impl LedgerRepository for FlakyLedger {
        fn find_users(&self, filter: UserFilter) -> LedgerResult<Vec<User>> {
            self.inner.find_users(filter)
        }
        fn find_user(&self, id: Uuid) -> LedgerResult<Option<User>> {
            self.inner.find_user(id)
        }
        fn create_user(&self, user: &User) -> LedgerResult<()> {
            self.inner.create_user(user)
        }
        fn find_categories(&self) -> LedgerResult<Vec<Category>> {
            self.inner.find_categories()
        }
        fn find_category(&self, id: Uuid) -> LedgerResult<Option<Category>> {
            self.inner.find_category(id)
        }
        fn create_category(&self, category: &Category) -> LedgerResult<()> {
            self.inner.create_category(category)
        }
        fn find_expenses(&self, query: ExpenseQuery) -> LedgerResult<Vec<Expense>> {
            self.inner.find_expenses(query)
        }
        fn find_expense(&self, id: Uuid) -> LedgerResult<Option<Expense>> {
            self.inner.find_expense(id)
        }
        fn create_expense(&self, expense: &Expense) -> LedgerResult<()> {
            let failing = *self.failing_template.lock().unwrap();
            if failing.is_some() && expense.recurring_expense_id == failing {
                return Err(LedgerError::Storage("disk full".into()));
            }
            self.inner.create_expense(expense)
        }
        fn update_expense_fields(&self, expense: &Expense) -> LedgerResult<()> {
            self.inner.update_expense_fields(expense)
        }
        fn delete_expense(&self, id: Uuid) -> LedgerResult<bool> {
            self.inner.delete_expense(id)
        }
        fn count_expenses_for_template_and_month(
            &self,
            template_id: Uuid,
            period: Period,
        ) -> LedgerResult<usize> {
            self.inner
                .count_expenses_for_template_and_month(template_id, period)
        }
        fn find_templates(&self, filter: TemplateFilter) -> LedgerResult<Vec<RecurringExpense>> {
            self.inner.find_templates(filter)
        }
        fn find_template(&self, id: Uuid) -> LedgerResult<Option<RecurringExpense>> {
            self.inner.find_template(id)
        }
        fn create_template(&self, template: &RecurringExpense) -> LedgerResult<()> {
            self.inner.create_template(template)
        }
        fn update_template_fields(&self, template: &RecurringExpense) -> LedgerResult<()> {
            self.inner.update_template_fields(template)
        }
        fn find_payments(&self, period: Period) -> LedgerResult<Vec<Payment>> {
            self.inner.find_payments(period)
        }
        fn create_payment(&self, payment: &Payment) -> LedgerResult<()> {
            self.inner.create_payment(payment)
        }
        fn delete_payment(&self, id: Uuid) -> LedgerResult<bool> {
            self.inner.delete_payment(id)
        }
    }

    /// Three approved monthly templates, with writes for the second one
    /// failing from February on. Returns the run and the failing id.
    fn february_run_with_one_broken_template(
        policy: FailurePolicy,
    ) -> (Arc<FlakyLedger>, ServiceResult<ProcessReport>, Uuid) {
        let repo = Arc::new(FlakyLedger::default());
        let clock = Arc::new(ManualClock::on(date(2024, 1, 15)));
        let alice = User::new("alice", "Alice");
        let bob = User::new("bob", "Bob");
        let category = Category::new("Bills", "receipt");
        repo.create_user(&alice).unwrap();
        repo.create_user(&bob).unwrap();
        repo.create_category(&category).unwrap();
        let service = RecurrenceService::with_policy(repo.clone(), clock.clone(), policy);

        let ids: Vec<Uuid> = ["Power", "Water", "Heating"]
            .into_iter()
            .map(|name| {
                let template = service
                    .create_template(
                        alice.id,
                        NewTemplate::recurring(category.id, name, Money::from_major(30)),
                    )
                    .unwrap();
                service.approve_template(template.id, &bob.actor()).unwrap();
                template.id
            })
            .collect();

        let broken = ids[1];
        repo.fail_writes_for(broken);
        clock.set_date(date(2024, 2, 3));
        (repo, service.process_due(), broken)
    }

    struct Fixture {
        repo: Arc<InMemoryLedger>,
        clock: Arc<ManualClock>,
        service: RecurrenceService,
        alice: User,
        bob: User,
        category: Category,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::on(date(2024, 1, 15)));
        let alice = User::new("alice", "Alice");
        let bob = User::new("bob", "Bob");
        let category = Category::new("Bills", "receipt");
        repo.create_user(&alice).unwrap();
        repo.create_user(&bob).unwrap();
        repo.create_category(&category).unwrap();
        let service = RecurrenceService::new(repo.clone(), clock.clone());
        Fixture {
            repo,
            clock,
            service,
            alice,
            bob,
            category,
        }
    }

    #[test]
    fn installment_templates_need_a_count() {
        let fx = fixture();
        let mut input = NewTemplate::installment(fx.category.id, "Laptop", Money::from_major(100), 3);
        input.installment_count = None;
        let err = fx.service.create_template(fx.alice.id, input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let zero = NewTemplate::installment(fx.category.id, "Laptop", Money::from_major(100), 0);
        let err = fx.service.create_template(fx.alice.id, zero).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn approval_materializes_current_month() {
        let fx = fixture();
        let template = fx
            .service
            .create_template(
                fx.alice.id,
                NewTemplate::recurring(fx.category.id, "Internet", Money::from_major(40)),
            )
            .unwrap();

        let (approved, outcome) = fx
            .service
            .approve_template(template.id, &fx.bob.actor())
            .unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        let expense = outcome.created().expect("expense for January");
        assert_eq!(expense.status, ApprovalStatus::Approved);
        assert_eq!(expense.recurring_expense_id, Some(template.id));
        assert_eq!(expense.period, Period::new(1, 2024).unwrap());
    }

    #[test]
    fn self_approval_of_template_is_forbidden() {
        let fx = fixture();
        let template = fx
            .service
            .create_template(
                fx.alice.id,
                NewTemplate::recurring(fx.category.id, "Gym", Money::from_major(30)),
            )
            .unwrap();
        let err = fx
            .service
            .approve_template(template.id, &fx.alice.actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = fx
            .service
            .reject_template(template.id, &fx.alice.actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn rejected_templates_never_materialize() {
        let fx = fixture();
        let template = fx
            .service
            .create_template(
                fx.alice.id,
                NewTemplate::recurring(fx.category.id, "Streaming", Money::from_major(12)),
            )
            .unwrap();
        fx.service
            .reject_template(template.id, &fx.bob.actor())
            .unwrap();
        let err = fx
            .service
            .materialize_for_month(template.id, date(2024, 1, 20))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let report = fx.service.process_due().unwrap();
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn materialization_is_idempotent_per_month() {
        let fx = fixture();
        let template = fx
            .service
            .create_template(
                fx.alice.id,
                NewTemplate::recurring(fx.category.id, "Rent", Money::from_major(900)),
            )
            .unwrap();
        fx.service
            .approve_template(template.id, &fx.bob.actor())
            .unwrap();

        let again = fx
            .service
            .materialize_for_month(template.id, date(2024, 1, 28))
            .unwrap();
        assert_eq!(again, Materialization::AlreadyMaterialized);
        let period = Period::new(1, 2024).unwrap();
        assert_eq!(
            fx.repo
                .count_expenses_for_template_and_month(template.id, period)
                .unwrap(),
            1
        );
    }

    #[test]
    fn drifted_installment_counter_deactivates_without_charging() {
        let fx = fixture();
        let template = fx
            .service
            .create_template(
                fx.alice.id,
                NewTemplate::installment(fx.category.id, "Phone", Money::from_major(50), 2),
            )
            .unwrap();
        fx.service
            .approve_template(template.id, &fx.bob.actor())
            .unwrap();

        let mut drifted = fx.service.get_template(template.id).unwrap();
        drifted.installments_remaining = Some(0);
        drifted.is_active = true;
        fx.repo.update_template_fields(&drifted).unwrap();

        fx.clock.set_date(date(2024, 2, 1));
        let outcome = fx
            .service
            .materialize_for_month(template.id, date(2024, 2, 1))
            .unwrap();
        assert_eq!(outcome, Materialization::Exhausted);
        assert!(!fx.service.get_template(template.id).unwrap().is_active);
        let february = fx
            .repo
            .find_expenses(ExpenseQuery::for_period(Period::new(2, 2024).unwrap()))
            .unwrap();
        assert!(february.is_empty());
    }

    #[test]
    fn deactivation_keeps_the_template() {
        let fx = fixture();
        let template = fx
            .service
            .create_template(
                fx.alice.id,
                NewTemplate::recurring(fx.category.id, "Cleaner", Money::from_major(80)),
            )
            .unwrap();
        let err = fx
            .service
            .deactivate_template(template.id, &fx.bob.actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let inactive = fx
            .service
            .deactivate_template(template.id, &fx.alice.actor())
            .unwrap();
        assert!(!inactive.is_active);
        assert_eq!(fx.service.list_templates().unwrap().len(), 1);
    }

    #[test]
    fn isolate_policy_reports_the_failure_and_keeps_going() {
        let (repo, run, broken) =
            february_run_with_one_broken_template(FailurePolicy::Isolate);
        let report = run.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].template_id, broken);
        assert_eq!(report.failures[0].error.kind(), ErrorKind::Infrastructure);
        assert!(!report.is_complete());
        assert!(report
            .created
            .iter()
            .all(|expense| expense.recurring_expense_id != Some(broken)));

        let february = Period::new(2, 2024).unwrap();
        assert_eq!(
            repo.count_expenses_for_template_and_month(broken, february)
                .unwrap(),
            0
        );
    }

    #[test]
    fn abort_policy_surfaces_the_failure() {
        let (repo, run, broken) =
            february_run_with_one_broken_template(FailurePolicy::AbortBatch);
        let err = run.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        let february = Period::new(2, 2024).unwrap();
        assert_eq!(
            repo.count_expenses_for_template_and_month(broken, february)
                .unwrap(),
            0
        );
    }

    #[test]
    fn abort_policy_runs_clean_batches_to_completion() {
        let fx = fixture();
        let template = fx
            .service
            .create_template(
                fx.alice.id,
                NewTemplate::recurring(fx.category.id, "Water", Money::from_major(20)),
            )
            .unwrap();
        fx.service
            .approve_template(template.id, &fx.bob.actor())
            .unwrap();

        let aborting = RecurrenceService::with_policy(
            fx.repo.clone(),
            fx.clock.clone(),
            FailurePolicy::AbortBatch,
        );
        fx.clock.set_date(date(2024, 2, 3));
        let report = aborting.process_due().unwrap();
        assert_eq!(aborting.policy(), FailurePolicy::AbortBatch);
        assert_eq!(report.examined, 1);
        assert_eq!(report.created.len(), 1);
        assert!(report.is_complete());

        let rerun = aborting.process_due().unwrap();
        assert!(rerun.created.is_empty());
        assert_eq!(rerun.skipped, 1);
    }
}
