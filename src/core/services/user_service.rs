use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::require_user;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::domain::User;
use crate::errors::LedgerError;
use crate::storage::{LedgerRepository, UserFilter};

/// Household membership. Settlement assumes at most two members.
pub struct UserService {
    repo: Arc<dyn LedgerRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub fn add(&self, username: &str, display_name: &str, is_admin: bool) -> ServiceResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "username must not be empty".into(),
            ));
        }
        let display_name = match display_name.trim() {
            "" => username,
            name => name,
        };
        if !is_admin && self.repo.find_users(UserFilter::Members)?.len() >= 2 {
            return Err(ServiceError::InvalidState(
                "the household already has two members".into(),
            ));
        }

        let user = if is_admin {
            User::new_admin(username, display_name)
        } else {
            User::new(username, display_name)
        };
        match self.repo.create_user(&user) {
            Ok(()) => {}
            Err(LedgerError::Duplicate(_)) => {
                return Err(ServiceError::Conflict(format!(
                    "username `{username}` is taken"
                )))
            }
            Err(err) => return Err(err.into()),
        }
        info!(user_id = %user.id, admin = is_admin, "user added");
        Ok(user)
    }

    pub fn get(&self, id: Uuid) -> ServiceResult<User> {
        require_user(self.repo.as_ref(), id)
    }

    pub fn list(&self, filter: UserFilter) -> ServiceResult<Vec<User>> {
        Ok(self.repo.find_users(filter)?)
    }
}
