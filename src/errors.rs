use thiserror::Error;

/// Infrastructure failures raised by ledger storage backends.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Duplicate record: {0}")]
    Duplicate(String),
    #[error("Storage error: {0}")]
    Storage(String),
}
