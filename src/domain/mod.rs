pub mod category;
pub mod common;
pub mod expense;
pub mod money;
pub mod payment;
pub mod recurring;
pub mod user;

pub use category::Category;
pub use common::{Actor, ApprovalStatus, Period};
pub use expense::{Expense, ExpensePatch, NewExpense};
pub use money::{InvalidSplitRatio, Money, SplitRatio};
pub use payment::Payment;
pub use recurring::{NewTemplate, RecurringExpense, RecurringKind, TemplatePatch};
pub use user::User;
