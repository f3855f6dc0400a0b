use std::sync::Arc;

use tracing::info;

use crate::core::errors::{ServiceError, ServiceResult};
use crate::domain::Category;
use crate::storage::LedgerRepository;

/// Name and icon of the categories a fresh ledger starts with.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Rent", "building"),
    ("Bills", "receipt"),
    ("Groceries", "shopping-cart"),
    ("Home", "home"),
    ("Entertainment", "gamepad"),
    ("Transport", "car"),
    ("Health", "heart-pulse"),
    ("Clothing", "shirt"),
    ("Dining", "utensils"),
    ("Other", "ellipsis"),
];

pub struct CategoryService {
    repo: Arc<dyn LedgerRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub fn list(&self) -> ServiceResult<Vec<Category>> {
        Ok(self.repo.find_categories()?)
    }

    /// Adds a category; names are unique ignoring case.
    pub fn add(&self, name: &str, icon: &str) -> ServiceResult<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "category name must not be empty".into(),
            ));
        }
        let taken = self
            .repo
            .find_categories()?
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(name));
        if taken {
            return Err(ServiceError::Conflict(format!(
                "category `{name}` already exists"
            )));
        }
        let category = Category::new(name, icon.trim());
        self.repo.create_category(&category)?;
        info!(category_id = %category.id, name = %category.name, "category added");
        Ok(category)
    }

    /// Installs [`DEFAULT_CATEGORIES`] when the ledger has none. Returns the
    /// number created.
    pub fn seed_defaults(&self) -> ServiceResult<usize> {
        if !self.repo.find_categories()?.is_empty() {
            return Ok(0);
        }
        for (name, icon) in DEFAULT_CATEGORIES {
            self.repo.create_category(&Category::new(*name, *icon))?;
        }
        info!(count = DEFAULT_CATEGORIES.len(), "default categories seeded");
        Ok(DEFAULT_CATEGORIES.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::storage::InMemoryLedger;

    #[test]
    fn seeding_only_touches_an_empty_ledger() {
        let service = CategoryService::new(Arc::new(InMemoryLedger::new()));
        assert_eq!(service.seed_defaults().unwrap(), DEFAULT_CATEGORIES.len());
        assert_eq!(service.seed_defaults().unwrap(), 0);
        assert_eq!(service.list().unwrap().len(), DEFAULT_CATEGORIES.len());
    }

    #[test]
    fn duplicate_names_conflict() {
        let service = CategoryService::new(Arc::new(InMemoryLedger::new()));
        service.add("Pets", "paw").unwrap();
        let err = service.add("  pets ", "paw").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
