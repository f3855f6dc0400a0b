use thiserror::Error;
use uuid::Uuid;

use crate::domain::InvalidSplitRatio;
use crate::errors::LedgerError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Business-rule failures, kept apart from storage faults so callers can map
/// them onto their own transport codes.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Transport-neutral classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidState,
    InvalidArgument,
    Conflict,
    Infrastructure,
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        ServiceError::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::InvalidState(_) => ErrorKind::InvalidState,
            ServiceError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Ledger(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<InvalidSplitRatio> for ServiceError {
    fn from(err: InvalidSplitRatio) -> Self {
        ServiceError::InvalidArgument(err.to_string())
    }
}
