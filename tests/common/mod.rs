#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use household_ledger::{
    core::{Clock, Household, ManualClock},
    domain::{Category, Money, NewExpense, User},
    storage::InMemoryLedger,
};

/// A household of two members, an admin and one category, with a clock
/// pinned to a chosen day.
pub struct TestHousehold {
    pub household: Household,
    pub repo: Arc<InMemoryLedger>,
    pub clock: Arc<ManualClock>,
    pub a: User,
    pub b: User,
    pub admin: User,
    pub category: Category,
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub fn setup_household(today: NaiveDate) -> TestHousehold {
    household_ledger::init();

    let repo = Arc::new(InMemoryLedger::new());
    let clock = Arc::new(ManualClock::on(today));
    let household = Household::new(repo.clone(), clock.clone());

    let a = household.users.add("a", "A", false).expect("add member a");
    let b = household.users.add("b", "B", false).expect("add member b");
    let admin = household.users.add("admin", "Admin", true).expect("add admin");
    let category = household
        .categories
        .add("Groceries", "shopping-cart")
        .expect("add category");

    TestHousehold {
        household,
        repo,
        clock,
        a,
        b,
        admin,
        category,
    }
}

impl TestHousehold {
    /// Shared expense at the default split, dated today.
    pub fn shared_expense(&self, amount: i64) -> NewExpense {
        NewExpense::shared(
            self.category.id,
            "Shared purchase",
            Money::from_major(amount),
            self.clock.today(),
        )
    }
}
