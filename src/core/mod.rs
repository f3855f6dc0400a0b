//! Business services over a [`LedgerRepository`](crate::storage::LedgerRepository).

pub mod errors;
pub mod locks;
pub mod services;
pub mod time;

use std::sync::Arc;

pub use errors::{ErrorKind, ServiceError, ServiceResult};
pub use time::{Clock, ManualClock, SystemClock};

use crate::storage::LedgerRepository;
use services::{
    CategoryService, ExpenseService, FailurePolicy, PaymentService, RecurrenceService,
    SettlementService, UserService,
};

/// Every service wired to one repository and clock.
pub struct Household {
    pub users: UserService,
    pub categories: CategoryService,
    pub expenses: ExpenseService,
    pub recurrence: RecurrenceService,
    pub settlement: SettlementService,
    pub payments: PaymentService,
}

impl Household {
    pub fn new(repo: Arc<dyn LedgerRepository>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(repo, clock, FailurePolicy::default())
    }

    pub fn with_policy(
        repo: Arc<dyn LedgerRepository>,
        clock: Arc<dyn Clock>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            users: UserService::new(Arc::clone(&repo)),
            categories: CategoryService::new(Arc::clone(&repo)),
            expenses: ExpenseService::new(Arc::clone(&repo), Arc::clone(&clock)),
            recurrence: RecurrenceService::with_policy(
                Arc::clone(&repo),
                Arc::clone(&clock),
                policy,
            ),
            settlement: SettlementService::new(Arc::clone(&repo)),
            payments: PaymentService::new(repo, clock),
        }
    }
}
