use std::{
    collections::HashSet,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};
use uuid::Uuid;

use super::memory::{InMemoryLedger, LedgerSnapshot, SNAPSHOT_SCHEMA_VERSION};
use super::{ExpenseQuery, LedgerRepository, Result, TemplateFilter, UserFilter};
use crate::domain::{Category, Expense, Payment, Period, RecurringExpense, User};
use crate::errors::LedgerError;

const TMP_SUFFIX: &str = "tmp";

/// Ledger persisted as a single JSON snapshot file.
///
/// Reads are served from memory; every mutation rewrites the file atomically
/// before returning.
#[derive(Debug)]
pub struct JsonLedgerStore {
    path: PathBuf,
    inner: InMemoryLedger,
    write_lock: Mutex<()>,
}

impl JsonLedgerStore {
    /// Opens `path`, starting from an empty ledger when the file is absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            load_snapshot_from_path(&path)?
        } else {
            debug!(path = %path.display(), "no ledger snapshot yet, starting empty");
            LedgerSnapshot::default()
        };
        for warning in snapshot_warnings(&snapshot) {
            warn!(path = %path.display(), "{warning}");
        }
        Ok(Self {
            path,
            inner: InMemoryLedger::from_snapshot(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.inner.snapshot()
    }

    /// Applies `op` and persists the result. When the file cannot be
    /// written the in-memory state is rolled back, so memory never runs ahead
    /// of disk.
    fn mutate<T>(&self, op: impl FnOnce(&InMemoryLedger) -> Result<T>) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LedgerError::Storage("snapshot writer lock poisoned".into()))?;
        let before = self.inner.snapshot()?;
        let outcome = op(&self.inner)?;
        if let Err(err) = save_snapshot_to_path(&self.inner.snapshot()?, &self.path) {
            warn!(path = %self.path.display(), error = %err, "ledger save failed, rolling back");
            self.inner.restore(before)?;
            return Err(err);
        }
        Ok(outcome)
    }
}

impl LedgerRepository for JsonLedgerStore {
    fn find_users(&self, filter: UserFilter) -> Result<Vec<User>> {
        self.inner.find_users(filter)
    }

    fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        self.inner.find_user(id)
    }

    fn create_user(&self, user: &User) -> Result<()> {
        self.mutate(|ledger| ledger.create_user(user))
    }

    fn find_categories(&self) -> Result<Vec<Category>> {
        self.inner.find_categories()
    }

    fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
        self.inner.find_category(id)
    }

    fn create_category(&self, category: &Category) -> Result<()> {
        self.mutate(|ledger| ledger.create_category(category))
    }

    fn find_expenses(&self, query: ExpenseQuery) -> Result<Vec<Expense>> {
        self.inner.find_expenses(query)
    }

    fn find_expense(&self, id: Uuid) -> Result<Option<Expense>> {
        self.inner.find_expense(id)
    }

    fn create_expense(&self, expense: &Expense) -> Result<()> {
        self.mutate(|ledger| ledger.create_expense(expense))
    }

    fn update_expense_fields(&self, expense: &Expense) -> Result<()> {
        self.mutate(|ledger| ledger.update_expense_fields(expense))
    }

    fn delete_expense(&self, id: Uuid) -> Result<bool> {
        self.mutate(|ledger| ledger.delete_expense(id))
    }

    fn count_expenses_for_template_and_month(
        &self,
        template_id: Uuid,
        period: Period,
    ) -> Result<usize> {
        self.inner
            .count_expenses_for_template_and_month(template_id, period)
    }

    fn find_templates(&self, filter: TemplateFilter) -> Result<Vec<RecurringExpense>> {
        self.inner.find_templates(filter)
    }

    fn find_template(&self, id: Uuid) -> Result<Option<RecurringExpense>> {
        self.inner.find_template(id)
    }

    fn create_template(&self, template: &RecurringExpense) -> Result<()> {
        self.mutate(|ledger| ledger.create_template(template))
    }

    fn update_template_fields(&self, template: &RecurringExpense) -> Result<()> {
        self.mutate(|ledger| ledger.update_template_fields(template))
    }

    fn find_payments(&self, period: Period) -> Result<Vec<Payment>> {
        self.inner.find_payments(period)
    }

    fn create_payment(&self, payment: &Payment) -> Result<()> {
        self.mutate(|ledger| ledger.create_payment(payment))
    }

    fn delete_payment(&self, id: Uuid) -> Result<bool> {
        self.mutate(|ledger| ledger.delete_payment(id))
    }
}

pub fn save_snapshot_to_path(snapshot: &LedgerSnapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = tmp_path(path);
    write_file(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load_snapshot_from_path(path: &Path) -> Result<LedgerSnapshot> {
    let data = fs::read_to_string(path)?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&data)?;
    if snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
        return Err(LedgerError::Storage(format!(
            "ledger `{}` uses schema {} but only {} is supported",
            path.display(),
            snapshot.schema_version,
            SNAPSHOT_SCHEMA_VERSION
        )));
    }
    Ok(snapshot)
}

/// Detects dangling references within a snapshot.
pub fn snapshot_warnings(snapshot: &LedgerSnapshot) -> Vec<String> {
    let user_ids: HashSet<_> = snapshot.users.iter().map(|u| u.id).collect();
    let category_ids: HashSet<_> = snapshot.categories.iter().map(|c| c.id).collect();
    let template_ids: HashSet<_> = snapshot.templates.iter().map(|t| t.id).collect();
    let mut warnings = Vec::new();

    for expense in &snapshot.expenses {
        if !user_ids.contains(&expense.created_by) {
            warnings.push(format!(
                "expense {} references unknown creator {}",
                expense.id, expense.created_by
            ));
        }
        if !category_ids.contains(&expense.category_id) {
            warnings.push(format!(
                "expense {} references missing category {}",
                expense.id, expense.category_id
            ));
        }
        if let Some(template_id) = expense.recurring_expense_id {
            if !template_ids.contains(&template_id) {
                warnings.push(format!(
                    "expense {} references missing template {}",
                    expense.id, template_id
                ));
            }
        }
    }
    for payment in &snapshot.payments {
        if !user_ids.contains(&payment.payer_id) || !user_ids.contains(&payment.payee_id) {
            warnings.push(format!("payment {} references an unknown user", payment.id));
        }
    }
    warnings
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_file(path: &Path, data: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}
